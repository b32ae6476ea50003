//! Daily triggers, one per (database, time of day).
//!
//! Every trigger is its own task sharing one clock. When a trigger fires it
//! spawns the backup as a separate task and goes straight back to waiting, so
//! a slow, failing or panicking job never delays or stops any trigger.

use chrono::{DateTime, NaiveTime, TimeZone};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::backup::BackupRunner;
use crate::clock::{Clock, resolve_local};
use crate::config::DatabaseSpec;

/// Upper bound on a single sleep, so wall-clock jumps are noticed within a minute.
const MAX_SLEEP: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct Trigger {
    pub database: Arc<DatabaseSpec>,
    pub time: NaiveTime,
}

pub struct Scheduler {
    triggers: Vec<Trigger>,
    runner: Arc<dyn BackupRunner>,
    clock: Arc<dyn Clock>,
}

/// First instant strictly after `after` at which the local clock reads `time`.
///
/// On a day the clock jumps forward over `time`, the trigger fires at the end
/// of the gap instead; when the clock falls back it fires on the first pass only.
pub fn next_fire_time<Tz: TimeZone>(after: &DateTime<Tz>, time: NaiveTime) -> Option<DateTime<Tz>> {
    let tz = after.timezone();
    let mut date = after.date_naive();
    for _ in 0..3 {
        if let Some(candidate) = resolve_local(&tz, date.and_time(time)) {
            if candidate > *after {
                return Some(candidate);
            }
        }
        date = date.succ_opt()?;
    }
    None
}

impl Scheduler {
    pub fn new(
        databases: &[DatabaseSpec],
        runner: Arc<dyn BackupRunner>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut triggers = Vec::new();
        for db in databases {
            let database = Arc::new(db.clone());
            for time in &db.times {
                triggers.push(Trigger {
                    database: Arc::clone(&database),
                    time: *time,
                });
            }
        }

        info!(
            "Registered {} daily trigger(s) for {} database(s)",
            triggers.len(),
            databases.len()
        );

        Self {
            triggers,
            runner,
            clock,
        }
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    /// Drives all triggers. Under normal operation this never returns; stop it
    /// by dropping the future (pending triggers are aborted with it).
    pub async fn run_forever(self) {
        let mut trigger_tasks = JoinSet::new();
        for trigger in self.triggers {
            trigger_tasks.spawn(run_trigger(
                trigger,
                Arc::clone(&self.runner),
                Arc::clone(&self.clock),
            ));
        }

        while let Some(finished) = trigger_tasks.join_next().await {
            if let Err(e) = finished {
                error!("Trigger task ended unexpectedly: {}", e);
            }
        }
        warn!("No triggers left to run");
    }
}

async fn run_trigger(trigger: Trigger, runner: Arc<dyn BackupRunner>, clock: Arc<dyn Clock>) {
    let name = trigger.database.name.clone();
    let Some(mut next) = next_fire_time(&clock.now(), trigger.time) else {
        error!(database = %name, time = %trigger.time, "Cannot compute next run time; trigger disabled");
        return;
    };
    info!(database = %name, time = %trigger.time, next_run = %next, "Trigger armed");

    loop {
        let now = clock.now();
        if now >= next {
            dispatch(Arc::clone(&trigger.database), Arc::clone(&runner));

            // Strictly after both the fired slot and now: one run per slot, no replays.
            let reference = if now > next { now } else { next };
            match next_fire_time(&reference, trigger.time) {
                Some(following) => next = following,
                None => {
                    error!(database = %name, "Cannot compute next run time; trigger disabled");
                    return;
                }
            }
            debug!(database = %name, next_run = %next, "Next backup scheduled");
            continue;
        }

        let wait = (next - now).to_std().unwrap_or(Duration::ZERO).min(MAX_SLEEP);
        tokio::time::sleep(wait).await;
    }
}

/// Runs one job on its own task; a supervising task reports how it ended.
fn dispatch(database: Arc<DatabaseSpec>, runner: Arc<dyn BackupRunner>) {
    let name = database.name.clone();
    info!(database = %name, "Trigger fired, starting backup");

    let job = tokio::spawn(async move { runner.run_backup(&database).await });
    tokio::spawn(async move {
        match job.await {
            Ok(Ok(location)) => info!(database = %name, location = %location, "Scheduled backup finished"),
            Ok(Err(e)) => error!(
                database = %name,
                stage = e.stage(),
                error = %e,
                "Scheduled backup failed; waiting for the next trigger"
            ),
            Err(join_error) if join_error.is_panic() => {
                error!(database = %name, "Scheduled backup panicked; waiting for the next trigger")
            }
            Err(join_error) => warn!(database = %name, "Scheduled backup was cancelled: {}", join_error),
        }
    });
}
