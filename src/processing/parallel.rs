// src/processing/parallel.rs
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use flume::RecvTimeoutError;
use itertools::iproduct;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::task::{run_task, Task, TaskContext, TaskOutcome, TaskState, TaskStatus};
use crate::catalog::{DateKey, PeriodKey, StatKey};
use crate::error::{ChvError, Result};

/// Longest the collector sleeps between timeout sweeps.
const MAX_POLL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    #[serde(rename = "MT")]
    Mt,
    #[serde(rename = "STM")]
    Stm,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Mt => f.write_str("MT"),
            Phase::Stm => f.write_str("STM"),
        }
    }
}

pub fn mt_tasks(dates: &[DateKey]) -> Vec<Task> {
    dates
        .iter()
        .map(|date| Task::Mt { date: date.clone() })
        .collect()
}

/// Every period paired with every statistic.
pub fn stm_tasks(periods: &[PeriodKey], stats: &[StatKey]) -> Vec<Task> {
    iproduct!(periods, stats)
        .map(|(period, stat)| Task::Stm {
            period: period.clone(),
            stat: stat.clone(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseSummary {
    pub phase: Phase,
    pub total: usize,
    pub succeeded: usize,
    pub no_data: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub outcomes: Vec<TaskOutcome>,
}

impl PhaseSummary {
    pub fn new(phase: Phase, outcomes: Vec<TaskOutcome>) -> Self {
        let count = |f: fn(&TaskStatus) -> bool| outcomes.iter().filter(|o| f(&o.status)).count();
        Self {
            phase,
            total: outcomes.len(),
            succeeded: count(|s| matches!(s, TaskStatus::Succeeded { .. })),
            no_data: count(|s| matches!(s, TaskStatus::NoData)),
            failed: count(|s| matches!(s, TaskStatus::Failed { .. })),
            timed_out: count(|s| matches!(s, TaskStatus::TimedOut)),
            outcomes,
        }
    }
}

impl fmt::Display for PhaseSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} tasks succeeded ({} no data, {} failed, {} timed out)",
            self.phase, self.succeeded, self.total, self.no_data, self.failed, self.timed_out
        )
    }
}

enum TaskEvent {
    Heartbeat { id: usize, state: TaskState },
    Finished { id: usize, outcome: TaskOutcome },
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// A task reported as timed out must not leave an output behind when its
/// worker eventually completes.
fn discard_late_output(task: &Task, outcome: &TaskOutcome) {
    let TaskStatus::Succeeded { output, .. } = &outcome.status else {
        warn!(task = %task, "task finished after its timeout");
        return;
    };
    match fs::remove_file(output) {
        Ok(()) => warn!(
            task = %task,
            output = %output.display(),
            "task finished after its timeout, output removed"
        ),
        Err(e) => error!(
            task = %task,
            output = %output.display(),
            error = %e,
            "task finished after its timeout, cannot remove output"
        ),
    }
}

/// Fixed-size worker pool running independent tasks.
pub struct ParallelProcessor {
    workers: usize,
    task_timeout: Option<Duration>,
    pool: rayon::ThreadPool,
}

impl ParallelProcessor {
    pub fn new(workers: usize, task_timeout: Option<Duration>) -> Result<Self> {
        let workers = workers.max(1);
        let cpus = num_cpus::get();
        if workers > cpus {
            warn!(workers, cpus, "more workers than CPUs");
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("chv-worker-{i}"))
            .build()
            .map_err(|e| ChvError::InvalidConfig(format!("cannot build worker pool: {e}")))?;

        Ok(Self {
            workers,
            task_timeout,
            pool,
        })
    }

    /// Run every task of a phase and wait until each one reaches a terminal
    /// status. Outcomes come back in task order.
    pub fn run_phase(&self, phase: Phase, ctx: Arc<TaskContext>, tasks: Vec<Task>) -> PhaseSummary {
        let total = tasks.len();
        info!(%phase, tasks = total, workers = self.workers, "dispatching phase");

        let (tx, rx) = flume::unbounded();
        // Set once per task by whichever side settles it first: the worker
        // on completion or the collector on timeout.
        let settled: Arc<Vec<AtomicBool>> =
            Arc::new((0..total).map(|_| AtomicBool::new(false)).collect());
        for (id, task) in tasks.iter().cloned().enumerate() {
            let tx = tx.clone();
            let ctx = Arc::clone(&ctx);
            let settled = Arc::clone(&settled);
            self.pool.spawn(move || {
                let start = Instant::now();
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    run_task(&ctx, &task, |state| {
                        let _ = tx.send(TaskEvent::Heartbeat { id, state });
                    })
                }));
                let outcome = result.unwrap_or_else(|payload| {
                    let err = ChvError::TaskPanicked(panic_message(payload.as_ref()));
                    error!(task = %task, error = %err, "task failed");
                    TaskOutcome::new(
                        task.clone(),
                        TaskStatus::Failed {
                            error: err.to_string(),
                        },
                        start.elapsed(),
                    )
                });
                if settled[id].swap(true, Ordering::SeqCst) {
                    discard_late_output(&task, &outcome);
                }
                let _ = tx.send(TaskEvent::Finished { id, outcome });
            });
        }
        drop(tx);

        let mut outcomes: Vec<Option<TaskOutcome>> = vec![None; total];
        // Started tasks still running, with the time of their last heartbeat.
        let mut running: HashMap<usize, Instant> = HashMap::new();
        let mut remaining = total;

        while remaining > 0 {
            let event = match self.task_timeout {
                Some(timeout) => match rx.recv_timeout(timeout.min(MAX_POLL)) {
                    Ok(event) => Some(event),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match rx.recv() {
                    Ok(event) => Some(event),
                    Err(_) => break,
                },
            };

            match event {
                Some(TaskEvent::Heartbeat { id, state }) => {
                    if outcomes[id].is_none() {
                        debug!(task = %tasks[id], %state, "heartbeat");
                        running.insert(id, Instant::now());
                    }
                }
                Some(TaskEvent::Finished { id, outcome }) => {
                    if outcomes[id].is_some() {
                        debug!(task = %tasks[id], "late result ignored");
                        continue;
                    }
                    running.remove(&id);
                    outcomes[id] = Some(outcome);
                    remaining -= 1;
                    info!(%phase, "[{}/{}] {} finished", total - remaining, total, tasks[id]);
                }
                None => {}
            }

            if let Some(timeout) = self.task_timeout {
                let now = Instant::now();
                let expired: Vec<usize> = running
                    .iter()
                    .filter(|(_, seen)| now.duration_since(**seen) > timeout)
                    .map(|(id, _)| *id)
                    .collect();
                for id in expired {
                    running.remove(&id);
                    if settled[id].swap(true, Ordering::SeqCst) {
                        // finished meanwhile, its result is already queued
                        continue;
                    }
                    error!(task = %tasks[id], ?timeout, "no heartbeat within timeout, giving up on task");
                    outcomes[id] = Some(TaskOutcome::new(
                        tasks[id].clone(),
                        TaskStatus::TimedOut,
                        timeout,
                    ));
                    remaining -= 1;
                }
            }
        }

        let outcomes = outcomes
            .into_iter()
            .zip(tasks)
            .map(|(outcome, task)| {
                outcome.unwrap_or_else(|| {
                    TaskOutcome::new(
                        task,
                        TaskStatus::Failed {
                            error: "worker exited without reporting".to_string(),
                        },
                        Duration::ZERO,
                    )
                })
            })
            .collect();

        let summary = PhaseSummary::new(phase, outcomes);
        info!("{summary}");
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stm_tasks_are_cartesian_product() {
        let periods: Vec<PeriodKey> = vec!["0506".into(), "0708".into()];
        let stats: Vec<StatKey> = vec!["maximum".into(), "mean".into(), "p90".into()];
        let tasks = stm_tasks(&periods, &stats);
        assert_eq!(tasks.len(), 6);
        assert_eq!(
            tasks[0],
            Task::Stm {
                period: "0506".into(),
                stat: "maximum".into()
            }
        );
        assert_eq!(
            tasks[5],
            Task::Stm {
                period: "0708".into(),
                stat: "p90".into()
            }
        );
        assert!(stm_tasks(&periods, &[]).is_empty());
    }

    #[test]
    fn test_mt_tasks() {
        let dates: Vec<DateKey> = vec!["20210512".into(), "20210601".into()];
        let tasks = mt_tasks(&dates);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].to_string(), "MT 20210601");
    }

    #[test]
    fn test_summary_counts() {
        let task = Task::Mt {
            date: "20210512".into(),
        };
        let outcomes = vec![
            TaskOutcome::new(task.clone(), TaskStatus::NoData, Duration::ZERO),
            TaskOutcome::new(task.clone(), TaskStatus::TimedOut, Duration::ZERO),
            TaskOutcome::new(
                task,
                TaskStatus::Failed {
                    error: "boom".into(),
                },
                Duration::ZERO,
            ),
        ];
        let summary = PhaseSummary::new(Phase::Mt, outcomes);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.no_data, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.timed_out, 1);
        assert_eq!(
            summary.to_string(),
            "MT: 0/3 tasks succeeded (1 no data, 1 failed, 1 timed out)"
        );
    }

    #[test]
    fn test_empty_phase() {
        let processor = ParallelProcessor::new(2, Some(Duration::from_secs(5))).unwrap();
        let config = crate::config::ChvConfig::default();
        let ctx = Arc::new(TaskContext::new(
            &config,
            Vec::new(),
            Box::new(crate::processing::reducer::RangeReducer),
        ));
        let summary = processor.run_phase(Phase::Stm, ctx, Vec::new());
        assert_eq!(summary.total, 0);
        assert!(summary.outcomes.is_empty());
    }
}
