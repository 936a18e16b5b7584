//! Bounded in-process job queue.
//!
//! [`ChannelJobQueue`] is the sending half handed to the dispatcher;
//! [`JobReceiver`] is drained by whatever runs index jobs. A full or closed
//! queue is reported as an error rather than waited on, so a stalled consumer
//! cannot block API requests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};

use repo_gate_core::models::RepoDescriptor;
use repo_gate_core::store::JobQueue;

/// One forced index job.
#[derive(Debug, Clone)]
pub struct IndexJob {
    pub repo: RepoDescriptor,
    pub forced: bool,
}

pub struct ChannelJobQueue {
    tx: mpsc::Sender<IndexJob>,
}

pub struct JobReceiver {
    rx: mpsc::Receiver<IndexJob>,
}

/// Creates a queue holding at most `capacity` pending jobs.
pub fn channel(capacity: usize) -> (ChannelJobQueue, JobReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (ChannelJobQueue { tx }, JobReceiver { rx })
}

#[async_trait]
impl JobQueue for ChannelJobQueue {
    async fn force_enqueue(&self, repo: &RepoDescriptor) -> Result<()> {
        let job = IndexJob {
            repo: repo.clone(),
            forced: true,
        };
        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => bail!("index job queue is full"),
            Err(TrySendError::Closed(_)) => bail!("index job queue is closed"),
        }
    }
}

impl JobReceiver {
    /// Waits for the next job. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<IndexJob> {
        self.rx.recv().await
    }

    /// Logs each job as it arrives until the queue closes.
    pub async fn drain(mut self) {
        while let Some(job) = self.recv().await {
            tracing::info!(
                repo = %job.repo.name,
                kind = job.repo.kind.as_str(),
                forced = job.forced,
                "index job queued"
            );
        }
    }
}
