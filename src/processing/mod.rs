// src/processing/mod.rs
pub mod parallel;
pub mod reducer;
pub mod sanitize;
pub mod stack;
pub mod task;

pub use parallel::{ParallelProcessor, Phase, PhaseSummary};
pub use reducer::{reduce_block, BlockPlan, Chv, ChvStats, PixelReducer, RangeReducer};
pub use sanitize::Sanitizer;
pub use stack::{load_stack, LayerStack};
pub use task::{run_task, Task, TaskContext, TaskOutcome, TaskState, TaskStatus};
