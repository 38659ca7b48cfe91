use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;

use super::RuntimeError;

#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self) -> Result<(), RuntimeError>;
}

/// Runs each registered job on its own fixed interval.
#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<(Arc<dyn ScheduledJob>, Duration)>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_job(mut self, job: Arc<dyn ScheduledJob>, every: Duration) -> Self {
        self.jobs.push((job, every));
        self
    }

    pub fn start(self) -> Vec<JoinHandle<()>> {
        info!("Starting scheduler with {} job(s)", self.jobs.len());
        self.jobs
            .into_iter()
            .map(|(job, every)| {
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(every);
                    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                    loop {
                        interval.tick().await;
                        info!("Running scheduled job {}", job.name());
                        if let Err(e) = job.run().await {
                            error!("Scheduled job {} failed: {}", job.name(), e);
                        }
                    }
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingJob(AtomicUsize);

    #[async_trait]
    impl ScheduledJob for CountingJob {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run(&self) -> Result<(), RuntimeError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(RuntimeError::Job("keeps going".to_string()))
        }
    }

    #[tokio::test]
    async fn test_job_runs_repeatedly_despite_errors() {
        let job = Arc::new(CountingJob(AtomicUsize::new(0)));
        let handles = Scheduler::new()
            .add_job(job.clone(), Duration::from_millis(10))
            .start();

        tokio::time::sleep(Duration::from_millis(55)).await;
        for handle in handles {
            handle.abort();
        }

        assert!(job.0.load(Ordering::SeqCst) >= 2);
    }
}
