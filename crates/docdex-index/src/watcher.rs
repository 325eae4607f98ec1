//! Debounced filesystem watcher that feeds coalesced change batches to a
//! reindex handler, one batch at a time.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::indexer::ChangeOp;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(5);

/// Receives each coalesced batch. Never called concurrently by a `Debouncer`.
pub trait ReindexHandler: Send + Sync + 'static {
    fn reindex(&self, batch: Vec<(PathBuf, ChangeOp)>) -> impl Future<Output = ()> + Send;
}

/// Pending changes keyed by path, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    entries: Vec<(PathBuf, ChangeOp)>,
}

impl ChangeSet {
    /// Record an event for `path`, folding it into any pending op.
    pub fn record(&mut self, path: PathBuf, op: ChangeOp) {
        let Some(slot) = self.entries.iter_mut().find(|(p, _)| *p == path) else {
            self.entries.push((path, op));
            return;
        };
        slot.1 = match (slot.1, op) {
            (ChangeOp::Delete, ChangeOp::Add) => ChangeOp::Modify,
            (current, ChangeOp::Add) => current,
            (_, next) => next,
        };
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> Option<ChangeOp> {
        self.entries.iter().find(|(p, _)| p == path).map(|(_, op)| *op)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Swap out everything pending.
    pub fn take(&mut self) -> Vec<(PathBuf, ChangeOp)> {
        std::mem::take(&mut self.entries)
    }
}

/// Single pending timer. Arming again aborts the previous one.
#[derive(Debug, Default)]
pub struct DebounceTimer {
    pending: Option<JoinHandle<()>>,
}

impl DebounceTimer {
    pub fn arm<F>(&mut self, delay: Duration, callback: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback.await;
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct Shared<H> {
    pending: Mutex<ChangeSet>,
    reindexing: AtomicBool,
    interval: Duration,
    handler: H,
}

impl<H> Shared<H> {
    fn take_pending(&self) -> Vec<(PathBuf, ChangeOp)> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Clears the in-progress flag even if the handler panics.
struct BatchGuard<H>(Arc<Shared<H>>);

impl<H> Drop for BatchGuard<H> {
    fn drop(&mut self) {
        self.0.reindexing.store(false, Ordering::SeqCst);
    }
}

/// Coalesces change events and hands them to `H` after a quiet period.
pub struct Debouncer<H: ReindexHandler> {
    shared: Arc<Shared<H>>,
    timer: DebounceTimer,
}

impl<H: ReindexHandler> Debouncer<H> {
    #[must_use]
    pub fn new(handler: H, interval: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                pending: Mutex::new(ChangeSet::default()),
                reindexing: AtomicBool::new(false),
                interval,
                handler,
            }),
            timer: DebounceTimer::default(),
        }
    }

    /// Record a change and restart the quiet period.
    pub fn push(&mut self, path: PathBuf, op: ChangeOp) {
        self.shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(path, op);
        let shared = Arc::clone(&self.shared);
        self.timer.arm(self.shared.interval, fire(shared));
    }

    #[must_use]
    pub fn is_reindexing(&self) -> bool {
        self.shared.reindexing.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn pending(&self) -> ChangeSet {
        self.shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

async fn fire<H: ReindexHandler>(shared: Arc<Shared<H>>) {
    while shared
        .reindexing
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        tracing::debug!("reindex in progress, deferring batch");
        tokio::time::sleep(shared.interval).await;
    }

    let guard = BatchGuard(Arc::clone(&shared));
    let batch = shared.take_pending();
    if batch.is_empty() {
        return;
    }
    // The batch outlives this timer: a later re-arm must not cancel it.
    tokio::spawn(async move {
        let guard = guard;
        guard.0.handler.reindex(batch).await;
    });
}

/// Translate a raw notify event into changes under `root`.
#[must_use]
pub fn classify_event(event: &Event, root: &Path) -> Vec<(PathBuf, ChangeOp)> {
    let mut out = Vec::new();
    let each = |out: &mut Vec<(PathBuf, ChangeOp)>, op: ChangeOp| {
        for path in &event.paths {
            out.push((path.clone(), op));
        }
    };

    match &event.kind {
        EventKind::Create(CreateKind::Folder)
        | EventKind::Remove(RemoveKind::Folder)
        | EventKind::Modify(ModifyKind::Metadata(_))
        | EventKind::Access(_)
        | EventKind::Any
        | EventKind::Other => {}
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            each(&mut out, ChangeOp::Add);
        }
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            each(&mut out, ChangeOp::Delete);
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if let [from, to] = event.paths.as_slice() {
                out.push((from.clone(), ChangeOp::Delete));
                out.push((to.clone(), ChangeOp::Add));
            }
        }
        EventKind::Modify(ModifyKind::Name(_)) => {
            for path in &event.paths {
                let op = if path.exists() {
                    ChangeOp::Add
                } else {
                    ChangeOp::Delete
                };
                out.push((path.clone(), op));
            }
        }
        EventKind::Modify(_) => each(&mut out, ChangeOp::Modify),
    }

    out.retain(|(path, op)| {
        path.starts_with(root)
            && is_watchable(path)
            && (*op == ChangeOp::Delete || !path.is_dir())
    });
    out
}

/// Skip dotfiles and editor scratch files.
fn is_watchable(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    !(name.starts_with('.')
        || name.ends_with('~')
        || name.ends_with(".swp")
        || name.ends_with(".tmp"))
}

pub struct IndexWatcher {
    _handle: JoinHandle<()>,
}

impl IndexWatcher {
    /// Watch `root` recursively and drive `handler` through a `Debouncer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the filesystem watcher cannot be initialized.
    pub fn start<H: ReindexHandler>(root: &Path, handler: H, debounce: Duration) -> Result<Self> {
        let root = std::path::absolute(root)?;
        let (notify_tx, mut notify_rx) = mpsc::channel::<(PathBuf, ChangeOp)>(256);

        let filter_root = root.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("index watcher error: {e}");
                    return;
                }
            };
            for change in classify_event(&event, &filter_root) {
                let _ = notify_tx.blocking_send(change);
            }
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;
        tracing::info!(root = %root.display(), debounce_ms = debounce.as_millis(), "watching documents");

        let handle = tokio::spawn(async move {
            let _watcher = watcher;
            let mut debouncer = Debouncer::new(handler, debounce);
            while let Some((path, op)) = notify_rx.recv().await {
                tracing::debug!(path = %path.display(), %op, "change queued");
                debouncer.push(path, op);
            }
        });

        Ok(Self { _handle: handle })
    }
}
