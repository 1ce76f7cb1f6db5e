use std::time::Duration;

use log::*;
use tokio::sync::mpsc;

use crate::jobs::Job;

/// The enqueue side of the job system. The reconciler and the runner only see this trait, which
/// keeps the delay mechanism (in-process timers here) swappable for a persistent queue.
pub trait JobScheduler: Clone + Send + Sync + 'static {
    fn enqueue(&self, job: Job);
    fn enqueue_after(&self, job: Job, delay: Duration);
}

/// In-process job queue with timer-based delays. Delayed jobs do not survive a restart; anything
/// that must fire eventually is rediscoverable from the store at startup.
#[derive(Clone)]
pub struct DelayedJobQueue {
    sender: mpsc::Sender<Job>,
}

impl DelayedJobQueue {
    pub fn new(buffer_size: usize) -> (Self, mpsc::Receiver<Job>) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        (Self { sender }, receiver)
    }
}

impl JobScheduler for DelayedJobQueue {
    fn enqueue(&self, job: Job) {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            trace!("🕰️ Enqueuing job {job}");
            if let Err(e) = sender.send(job).await {
                error!("🕰️ Failed to enqueue job: {e}");
            }
        });
    }

    fn enqueue_after(&self, job: Job, delay: Duration) {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            debug!("🕰️ Job {job} scheduled to fire in {}s", delay.as_secs());
            tokio::time::sleep(delay).await;
            if let Err(e) = sender.send(job).await {
                error!("🕰️ Failed to enqueue delayed job: {e}");
            }
        });
    }
}
