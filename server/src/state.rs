use blog_generator_cli::pipeline::BatchPipeline;
use blog_generator_cli::BatchResult;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// State of a submitted batch
#[derive(Clone, Debug)]
pub enum BatchStatus {
    Pending,
    Done { result: BatchResult, finished_at: Instant },
    Failed { error: String, finished_at: Instant },
}

impl BatchStatus {
    pub fn finished_at(&self) -> Option<Instant> {
        match self {
            BatchStatus::Pending => None,
            BatchStatus::Done { finished_at, .. } | BatchStatus::Failed { finished_at, .. } => {
                Some(*finished_at)
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at().is_some()
    }
}

// batch_id -> status, plus the cancel handle of batches still running.
// A finished batch stays until it is polled once or `evict_finished` drops it.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<DashMap<Uuid, BatchStatus>>,
    pub cancels: Arc<DashMap<Uuid, CancellationToken>>,
    pub pipeline: Arc<BatchPipeline>,
}

impl AppState {
    pub fn new(pipeline: BatchPipeline) -> Self {
        AppState {
            jobs: Arc::new(DashMap::new()),
            cancels: Arc::new(DashMap::new()),
            pipeline: Arc::new(pipeline),
        }
    }

    /// Removes batches that finished more than `retention` ago; returns how many.
    pub fn evict_finished(&self, retention: Duration) -> usize {
        let before = self.jobs.len();
        self.jobs
            .retain(|_, status| status.finished_at().map_or(true, |at| at.elapsed() < retention));
        before - self.jobs.len()
    }

    /// Periodically evicts finished batches nobody collected.
    pub fn spawn_sweeper(&self, retention: Duration) -> tokio::task::JoinHandle<()> {
        let state = self.clone();
        let period = retention.clamp(Duration::from_secs(1), Duration::from_secs(60));
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            loop {
                tick.tick().await;
                let evicted = state.evict_finished(retention);
                if evicted > 0 {
                    tracing::info!(evicted, "dropped uncollected batch results");
                }
            }
        })
    }
}
