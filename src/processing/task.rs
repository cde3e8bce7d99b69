// src/processing/task.rs
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use super::reducer::{reduce_block, BlockPlan, ChvStats, PixelReducer};
use super::sanitize::Sanitizer;
use super::stack::load_stack;
use crate::catalog::{naming, Catalog, DateKey, IndexName, PeriodKey, StatKey};
use crate::config::ChvConfig;
use crate::error::{ChvError, Result};
use crate::io::ChvWriter;

/// One independent unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Task {
    Mt { date: DateKey },
    Stm { period: PeriodKey, stat: StatKey },
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Mt { date } => write!(f, "MT {date}"),
            Task::Stm { period, stat } => write!(f, "STM {period}/{stat}"),
        }
    }
}

impl Task {
    pub fn input_path(&self, catalog: &Catalog, index: &IndexName) -> PathBuf {
        match self {
            Task::Mt { date } => catalog.mt_path(date, index),
            Task::Stm { period, stat } => catalog.stm_path(period, index, stat),
        }
    }

    pub fn output_name(&self) -> String {
        match self {
            Task::Mt { date } => naming::mt_output_name(date),
            Task::Stm { period, stat } => naming::stm_output_name(period, stat),
        }
    }
}

/// Progress of a running task. Every transition is reported as a heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Loading,
    Reducing { block: usize, blocks: usize },
    Writing,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Loading => f.write_str("loading"),
            TaskState::Reducing { block, blocks } => write!(f, "reducing {}/{}", block + 1, blocks),
            TaskState::Writing => f.write_str("writing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    Succeeded { output: PathBuf, stats: ChvStats },
    NoData,
    Failed { error: String },
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutcome {
    pub task: Task,
    #[serde(flatten)]
    pub status: TaskStatus,
    pub elapsed_ms: u64,
}

impl TaskOutcome {
    pub fn new(task: Task, status: TaskStatus, elapsed: Duration) -> Self {
        Self {
            task,
            status,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.status, TaskStatus::Succeeded { .. })
    }

    /// `(success, output path)`
    pub fn as_pair(&self) -> (bool, Option<PathBuf>) {
        match &self.status {
            TaskStatus::Succeeded { output, .. } => (true, Some(output.clone())),
            _ => (false, None),
        }
    }
}

/// Read-only inputs shared by every task of a run.
pub struct TaskContext {
    pub catalog: Catalog,
    pub indices: Vec<IndexName>,
    pub output_root: PathBuf,
    pub block_height: usize,
    pub sanitizer: Sanitizer,
    pub creation_options: Vec<String>,
    pub reducer: Box<dyn PixelReducer>,
}

impl TaskContext {
    pub fn new(config: &ChvConfig, indices: Vec<IndexName>, reducer: Box<dyn PixelReducer>) -> Self {
        Self {
            catalog: Catalog::new(&config.input_root),
            indices,
            output_root: config.output_root(),
            block_height: config.block_height,
            sanitizer: Sanitizer::from_config(config),
            creation_options: config.creation_options(),
            reducer,
        }
    }

    pub fn output_path(&self, task: &Task) -> PathBuf {
        self.output_root.join(task.output_name())
    }
}

/// Run one task to a terminal status. Errors are folded into
/// `TaskStatus::Failed`; `heartbeat` is called on every state change.
pub fn run_task<H>(ctx: &TaskContext, task: &Task, mut heartbeat: H) -> TaskOutcome
where
    H: FnMut(TaskState),
{
    let span = info_span!("task", task = %task, reducer = ctx.reducer.name());
    let _enter = span.enter();
    let start = Instant::now();

    let status = match execute(ctx, task, &mut heartbeat) {
        Ok(status) => status,
        Err(e) => TaskStatus::Failed {
            error: e.to_string(),
        },
    };

    let outcome = TaskOutcome::new(task.clone(), status, start.elapsed());
    match &outcome.status {
        TaskStatus::Succeeded { output, stats } => {
            info!(
                output = %output.display(),
                valid_pct = stats.valid_ratio(),
                elapsed_ms = outcome.elapsed_ms,
                "task done"
            );
            if stats.is_degenerate() {
                warn!(output = %output.display(), "output range is degenerate");
            }
        }
        TaskStatus::NoData => warn!("no valid layers found"),
        TaskStatus::Failed { error } => tracing::error!(%error, "task failed"),
        TaskStatus::TimedOut => {}
    }
    outcome
}

/// An output left by an earlier run (possibly empty or truncated) never
/// survives a rerun: the task either rewrites it or ends with none.
fn remove_stale_output(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(output = %path.display(), "removed previous output");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ChvError::io(path, e)),
    }
}

fn execute<H>(ctx: &TaskContext, task: &Task, heartbeat: &mut H) -> Result<TaskStatus>
where
    H: FnMut(TaskState),
{
    heartbeat(TaskState::Loading);
    let output_path = ctx.output_path(task);
    remove_stale_output(&output_path)?;

    let stack = load_stack(
        &ctx.indices,
        |index| task.input_path(&ctx.catalog, index),
        &ctx.sanitizer,
    )?;
    let Some(stack) = stack else {
        return Ok(TaskStatus::NoData);
    };

    let indices: Vec<&str> = stack.indices().iter().map(IndexName::as_str).collect();
    info!(indices = ?indices, "{} layers stacked", stack.depth());

    fs::create_dir_all(&ctx.output_root).map_err(|e| ChvError::io(&ctx.output_root, e))?;
    let mut writer = ChvWriter::create(&output_path, stack.geo_info(), &ctx.creation_options)?;
    let plan = BlockPlan::new(stack.height(), ctx.block_height);
    let mut stats = ChvStats::default();

    for (block, rows) in plan.blocks().enumerate() {
        heartbeat(TaskState::Reducing {
            block,
            blocks: plan.len(),
        });
        debug!(block, r0 = rows.start, r1 = rows.end, "reducing block");
        let row_offset = rows.start;
        let height = rows.len();
        let data = reduce_block(ctx.reducer.as_ref(), &stack, rows);
        stats.update(&data);
        writer.write_block(row_offset, height, data)?;
    }

    heartbeat(TaskState::Writing);
    let output = writer.finish()?;
    Ok(TaskStatus::Succeeded { output, stats })
}
