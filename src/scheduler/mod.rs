pub mod tasks;

use std::future::Future;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info};

/// Housekeeping jobs that run next to the relay (side-table sweep, heartbeat)
pub struct Scheduler {
    inner: JobScheduler,
    jobs: Vec<&'static str>,
}

impl Scheduler {
    pub async fn new() -> Result<Self> {
        let inner = JobScheduler::new()
            .await
            .context("Failed to create job scheduler")?;
        Ok(Self {
            inner,
            jobs: Vec::new(),
        })
    }

    /// Run `task` on a six-field cron schedule (seconds first).
    ///
    /// Each tick calls `task` for a fresh future, so captured state must be cloned inside it.
    pub async fn add_job<F, Fut>(
        &mut self,
        name: &'static str,
        cron_expr: &str,
        task: F,
    ) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let job = Job::new_async(cron_expr, move |_id, _lock| {
            let tick = task();
            Box::pin(async move {
                debug!("Running job '{}'", name);
                tick.await;
            })
        })
        .with_context(|| format!("Invalid schedule '{cron_expr}' for job '{name}'"))?;

        self.inner
            .add(job)
            .await
            .with_context(|| format!("Failed to add job '{name}'"))?;
        self.jobs.push(name);
        Ok(())
    }

    /// Names of the registered jobs, in registration order.
    pub fn jobs(&self) -> &[&'static str] {
        &self.jobs
    }

    pub async fn start(&self) -> Result<()> {
        self.inner
            .start()
            .await
            .context("Failed to start scheduler")?;
        info!("Scheduler started with jobs: {}", self.jobs().join(", "));
        Ok(())
    }

    pub async fn shutdown(mut self) -> Result<()> {
        self.inner
            .shutdown()
            .await
            .context("Failed to shutdown scheduler")?;
        info!("Scheduler stopped");
        Ok(())
    }
}
