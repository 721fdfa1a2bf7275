use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::correlator::Correlator;
use crate::scheduler::Scheduler;

/// Register the side-table sweep and the heartbeat
pub async fn register_builtin_tasks(
    scheduler: &mut Scheduler,
    correlator: Arc<Correlator>,
    sweep_cron: &str,
) -> anyhow::Result<()> {
    let sweeper = correlator.clone();
    scheduler
        .add_job("side-table-sweep", sweep_cron, move || {
            let correlator = sweeper.clone();
            async move {
                sweep_expired(&correlator, Instant::now());
            }
        })
        .await?;

    scheduler
        .add_job("heartbeat", "0 0 * * * *", move || {
            let correlator = correlator.clone();
            async move { heartbeat(&correlator) }
        })
        .await?;

    Ok(())
}

fn heartbeat(correlator: &Correlator) {
    let table = correlator.side_table();
    if table.is_empty() {
        info!("Heartbeat: relay is alive, no questions awaiting answers");
    } else {
        info!(
            "Heartbeat: relay is alive, {} question(s) awaiting answers",
            table.len()
        );
    }
}

/// Drop expired side-table entries, returning how many went.
pub fn sweep_expired(correlator: &Correlator, now: Instant) -> usize {
    let removed = correlator.side_table().sweep(now);
    if removed > 0 {
        info!("Swept {} expired question(s) from the side table", removed);
    }
    removed
}
