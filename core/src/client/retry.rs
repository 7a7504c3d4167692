// Retry scheduler: one background worker, one delayed-task timeline
//
// Pending retries share a single timer rather than a task each, so the
// number of scheduled retries never grows the concurrency. Due tasks are
// handed to the caller's channel; execution stays in the client.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

enum Command<T> {
    Schedule { due: Instant, task: T },
    CancelAll,
}

struct Entry<T> {
    due: Instant,
    seq: u64,
    task: T,
}

// min-heap on (due, seq); the task itself never takes part in ordering
impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.due, other.seq).cmp(&(self.due, self.seq))
    }
}

/// Schedules delayed re-attempts on a single background timeline.
pub struct RetryScheduler<T> {
    commands: mpsc::UnboundedSender<Command<T>>,
    alive: Arc<AtomicBool>,
}

impl<T: Send + 'static> RetryScheduler<T> {
    /// Spawn the worker. Tasks that come due are emitted on `due_tx`.
    pub fn new(due_tx: mpsc::UnboundedSender<T>) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));
        tokio::spawn(worker(commands_rx, due_tx, Arc::clone(&alive)));
        Self { commands, alive }
    }

    /// Enqueue a task to come due after `delay`. Dropped silently once
    /// the scheduler is cancelled.
    pub fn schedule_after(&self, delay: Duration, task: T) {
        if !self.alive.load(AtomicOrdering::SeqCst) {
            return;
        }
        let _ = self.commands.send(Command::Schedule {
            due: Instant::now() + delay,
            task,
        });
    }

    /// Drop every scheduled task and stop the worker. Idempotent; no task
    /// scheduled before or after this call will be emitted.
    pub fn cancel_all(&self) {
        self.alive.store(false, AtomicOrdering::SeqCst);
        let _ = self.commands.send(Command::CancelAll);
    }
}

async fn worker<T>(
    mut commands: mpsc::UnboundedReceiver<Command<T>>,
    due_tx: mpsc::UnboundedSender<T>,
    alive: Arc<AtomicBool>,
) {
    let mut timeline: BinaryHeap<Entry<T>> = BinaryHeap::new();
    let mut seq = 0u64;
    loop {
        let next_due = timeline.peek().map(|e| e.due);
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Schedule { due, task }) => {
                    if alive.load(AtomicOrdering::SeqCst) {
                        timeline.push(Entry { due, seq, task });
                        seq += 1;
                    }
                }
                Some(Command::CancelAll) | None => {
                    debug!(dropped = timeline.len(), "retry scheduler cancelled");
                    return;
                }
            },
            // sleep branch only armed while something is scheduled
            _ = sleep_until_due(next_due), if next_due.is_some() => {
                let now = Instant::now();
                while let Some(entry) = timeline.peek() {
                    if entry.due > now {
                        break;
                    }
                    let entry = match timeline.pop() {
                        Some(entry) => entry,
                        None => break,
                    };
                    if alive.load(AtomicOrdering::SeqCst)
                        && due_tx.send(entry.task).is_err()
                    {
                        return;
                    }
                }
            }
        }
    }
}

async fn sleep_until_due(due: Option<Instant>) {
    if let Some(due) = due {
        tokio::time::sleep_until(due).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_tasks_come_due_in_delay_order() {
        let (due_tx, mut due_rx) = mpsc::unbounded_channel();
        let scheduler = RetryScheduler::new(due_tx);

        scheduler.schedule_after(Duration::from_millis(60), "slow");
        scheduler.schedule_after(Duration::from_millis(10), "fast");

        let first = timeout(Duration::from_secs(1), due_rx.recv())
            .await
            .unwrap()
            .unwrap();
        let second = timeout(Duration::from_secs(1), due_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, "fast");
        assert_eq!(second, "slow");
    }

    #[tokio::test]
    async fn test_task_not_emitted_before_delay() {
        let (due_tx, mut due_rx) = mpsc::unbounded_channel();
        let scheduler = RetryScheduler::new(due_tx);

        scheduler.schedule_after(Duration::from_millis(100), ());
        assert!(timeout(Duration::from_millis(20), due_rx.recv())
            .await
            .is_err());
        assert!(timeout(Duration::from_secs(1), due_rx.recv())
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_cancel_all_drops_scheduled_tasks() {
        let (due_tx, mut due_rx) = mpsc::unbounded_channel();
        let scheduler = RetryScheduler::new(due_tx);

        scheduler.schedule_after(Duration::from_millis(30), ());
        scheduler.cancel_all();
        scheduler.cancel_all(); // idempotent

        assert!(timeout(Duration::from_millis(100), due_rx.recv())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_schedule_after_cancel_is_a_noop() {
        let (due_tx, mut due_rx) = mpsc::unbounded_channel();
        let scheduler = RetryScheduler::new(due_tx);

        scheduler.cancel_all();
        scheduler.schedule_after(Duration::from_millis(1), ());

        assert!(timeout(Duration::from_millis(50), due_rx.recv())
            .await
            .unwrap()
            .is_none());
    }
}
