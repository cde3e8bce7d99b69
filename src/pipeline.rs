// src/pipeline.rs
//! Catalog resolution and the MT-then-STM run.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::{Catalog, DateKey, IndexName, PeriodKey, StatKey};
use crate::config::ChvConfig;
use crate::error::{ChvError, Result};
use crate::processing::parallel::{mt_tasks, stm_tasks};
use crate::processing::{ParallelProcessor, Phase, PhaseSummary, RangeReducer, Task, TaskContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhaseSelection {
    #[default]
    All,
    Mt,
    Stm,
}

impl PhaseSelection {
    fn includes(self, phase: Phase) -> bool {
        match (self, phase) {
            (PhaseSelection::All, _) => true,
            (PhaseSelection::Mt, Phase::Mt) | (PhaseSelection::Stm, Phase::Stm) => true,
            _ => false,
        }
    }
}

/// Everything discovered in the input catalog, and the tasks it yields.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub indices: Vec<IndexName>,
    pub dates: Vec<DateKey>,
    pub periods: Vec<PeriodKey>,
    pub stats: Vec<StatKey>,
    pub mt_tasks: Vec<Task>,
    pub stm_tasks: Vec<Task>,
}

impl Plan {
    pub fn resolve(config: &ChvConfig) -> Result<Self> {
        let catalog = Catalog::new(&config.input_root);
        if config.strict_catalog {
            catalog.check_uniform()?;
        }

        let indices = catalog.list_indices();
        let dates = catalog.list_mt_dates();
        let periods = catalog.list_stm_periods();
        let stats = catalog.list_stm_stats();
        dates.log_rejected();
        stats.log_rejected();

        let (dates, stats) = if config.strict_catalog {
            (dates.strict()?, stats.strict()?)
        } else {
            (dates.entries, stats.entries)
        };

        Ok(Self {
            mt_tasks: mt_tasks(&dates),
            stm_tasks: stm_tasks(&periods, &stats),
            indices,
            dates,
            periods,
            stats,
        })
    }

    pub fn tasks(&self, phase: Phase) -> &[Task] {
        match phase {
            Phase::Mt => &self.mt_tasks,
            Phase::Stm => &self.stm_tasks,
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Indices ({}): {}", self.indices.len(), join(&self.indices))?;
        writeln!(f, "MT dates ({}): {}", self.dates.len(), join(&self.dates))?;
        writeln!(f, "STM periods ({}): {}", self.periods.len(), join(&self.periods))?;
        writeln!(f, "STM stats ({}): {}", self.stats.len(), join(&self.stats))?;
        for task in self.mt_tasks.iter().chain(&self.stm_tasks) {
            writeln!(f, "  {task}")?;
        }
        write!(
            f,
            "{} MT tasks, {} STM tasks",
            self.mt_tasks.len(),
            self.stm_tasks.len()
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Name of the per-pixel reduction that produced the outputs.
    pub reducer: String,
    pub phases: Vec<PhaseSummary>,
}

impl RunReport {
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| ChvError::io(path, e))
    }

    pub fn summary(&self, phase: Phase) -> Option<&PhaseSummary> {
        self.phases.iter().find(|s| s.phase == phase)
    }
}

/// Resolve the catalog and run the selected phases, MT first.
/// Empty phases are skipped; failed tasks never abort the run.
pub fn run(config: &ChvConfig, selection: PhaseSelection) -> Result<RunReport> {
    config.validate()?;
    let plan = Plan::resolve(config)?;
    let processor = ParallelProcessor::new(config.workers, config.task_timeout())?;
    let ctx = Arc::new(TaskContext::new(
        config,
        plan.indices.clone(),
        Box::new(RangeReducer),
    ));

    info!(
        input = %config.input_root.display(),
        output = %config.output_root().display(),
        indices = plan.indices.len(),
        reducer = ctx.reducer.name(),
        "starting CHV run"
    );

    let mut phases = Vec::new();
    for phase in [Phase::Mt, Phase::Stm] {
        if !selection.includes(phase) {
            continue;
        }
        let tasks = plan.tasks(phase).to_vec();
        if tasks.is_empty() {
            warn!(%phase, "nothing to do, skipping phase");
            continue;
        }
        phases.push(processor.run_phase(phase, Arc::clone(&ctx), tasks));
    }

    Ok(RunReport {
        reducer: ctx.reducer.name().to_string(),
        phases,
    })
}
