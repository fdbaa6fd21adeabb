//! Scheduling for deferred payment captures.
//!
//! Deferred-capture providers (Stripe, Apple Pay) place a hold at authorization time and finalize
//! it a short while later, unless the client cancels first. Each pending obligation is an
//! explicitly owned, cancellable task keyed by transaction id; at most one exists per transaction,
//! and arming a new one supersedes any prior one for the same id.
//!
//! The scheduler only decides *when* a capture fires. When a task's delay elapses the transaction
//! id is sent to a capture worker over a channel, and the worker performs the actual provider
//! call; a cancelled task never sends.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
        Mutex,
    },
    time::Duration,
};

use log::*;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::db_types::TransactionId;

/// Pending tasks, tagged with the generation that armed them so a task that has already been
/// superseded can never deregister its replacement.
type TaskTable = Mutex<HashMap<TransactionId, (u64, JoinHandle<()>)>>;

#[derive(Clone)]
pub struct CaptureScheduler {
    tasks: Arc<TaskTable>,
    generation: Arc<AtomicU64>,
    trigger: mpsc::Sender<TransactionId>,
}

impl CaptureScheduler {
    /// Create a scheduler that fires due captures into `trigger`. The receiving end is serviced
    /// by a capture worker.
    pub fn new(trigger: mpsc::Sender<TransactionId>) -> Self {
        Self { tasks: Arc::new(Mutex::new(HashMap::new())), generation: Arc::new(AtomicU64::new(0)), trigger }
    }

    /// Convenience constructor that also hands back the channel the worker should listen on.
    pub fn with_channel(buffer: usize) -> (Self, mpsc::Receiver<TransactionId>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }

    /// Arm an auto-capture task for `txid`, superseding (cancelling) any task already pending for
    /// the same transaction.
    pub fn arm(&self, txid: TransactionId, delay: Duration) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let tasks = Arc::clone(&self.tasks);
        let trigger = self.trigger.clone();
        let key = txid.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Deregister before firing so a cancel racing the trigger sees no pending task. Only
            // our own entry may go: a superseding arm can have replaced it while we slept.
            deregister(&tasks, &key, generation);
            debug!("⏲️ Auto-capture timer fired for [{key}]");
            if let Err(e) = trigger.send(key).await {
                error!("⏲️ Could not deliver capture trigger: {e}");
            }
        });
        let mut tasks = match self.tasks.lock() {
            Ok(t) => t,
            Err(e) => {
                error!("⏲️ Capture task table is poisoned: {e}");
                handle.abort();
                return;
            },
        };
        if let Some((_, old)) = tasks.insert(txid.clone(), (generation, handle)) {
            debug!("⏲️ Superseding pending capture task for [{txid}]");
            old.abort();
        }
        trace!("⏲️ Armed auto-capture for [{txid}] in {delay:?}");
    }

    /// Cancel the pending capture task for `txid`, if one exists. Returns `true` when a task was
    /// pending and has been cancelled.
    pub fn cancel(&self, txid: &TransactionId) -> bool {
        let handle = self.tasks.lock().ok().and_then(|mut t| t.remove(txid));
        match handle {
            Some((_, h)) => {
                h.abort();
                debug!("⏲️ Cancelled pending capture task for [{txid}]");
                true
            },
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.tasks.lock().map(|t| t.len()).unwrap_or(0)
    }
}

/// Remove the entry for `key`, but only if it still belongs to `generation`. Returns whether an
/// entry was removed.
fn deregister(tasks: &TaskTable, key: &TransactionId, generation: u64) -> bool {
    let Ok(mut tasks) = tasks.lock() else {
        return false;
    };
    match tasks.get(key) {
        Some((current, _)) if *current == generation => {
            tasks.remove(key);
            true
        },
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn armed_task_fires_once() {
        let (scheduler, mut rx) = CaptureScheduler::with_channel(4);
        scheduler.arm(TransactionId::from("T1"), Duration::from_millis(10));
        let fired = rx.recv().await.expect("expected a trigger");
        assert_eq!(fired, TransactionId::from("T1"));
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_task_never_fires() {
        let (scheduler, mut rx) = CaptureScheduler::with_channel(4);
        scheduler.arm(TransactionId::from("T1"), Duration::from_millis(50));
        assert!(scheduler.cancel(&TransactionId::from("T1")));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
        // A second cancel is a no-op.
        assert!(!scheduler.cancel(&TransactionId::from("T1")));
    }

    #[tokio::test]
    async fn rearming_supersedes_the_pending_task() {
        let (scheduler, mut rx) = CaptureScheduler::with_channel(4);
        scheduler.arm(TransactionId::from("T1"), Duration::from_millis(30));
        scheduler.arm(TransactionId::from("T1"), Duration::from_millis(60));
        assert_eq!(scheduler.pending_count(), 1);
        let fired = rx.recv().await.expect("expected a trigger");
        assert_eq!(fired, TransactionId::from("T1"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        // Only the superseding task fired.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn an_elapsed_task_cannot_deregister_its_replacement() {
        let (scheduler, _rx) = CaptureScheduler::with_channel(4);
        scheduler.arm(TransactionId::from("T1"), Duration::from_secs(60));
        scheduler.arm(TransactionId::from("T1"), Duration::from_secs(60));
        // The first arming used generation 0. If its timer had already elapsed when it was
        // superseded, its late deregistration must leave the replacement in place.
        assert!(!deregister(&scheduler.tasks, &TransactionId::from("T1"), 0));
        assert_eq!(scheduler.pending_count(), 1);
        assert!(scheduler.cancel(&TransactionId::from("T1")));
    }
}
