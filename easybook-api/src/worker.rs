use chrono::Utc;
use easybook_order::ReminderSweep;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Runs the day-before reminder sweep every `every` (at least one second),
/// starting immediately. A failed sweep is logged and the loop carries on.
pub async fn start_reminder_worker(sweep: Arc<ReminderSweep>, every: Duration) {
    if every < MIN_INTERVAL {
        warn!(interval_ms = every.as_millis() as u64, "Reminder interval too short, using 1s");
    }
    let every = every.max(MIN_INTERVAL);
    info!(interval_seconds = every.as_secs(), "Reminder worker started");

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        match sweep.run_once(Utc::now()).await {
            Ok(report) => debug!(?report, "Reminder tick"),
            Err(e) => error!("Reminder sweep failed: {}", e),
        }
    }
}
