//! Conductor System
//!
//! Brief assembly, plan parsing and the sequential stage pipeline shared by
//! the workflows.

pub mod brief;
pub mod pipeline;
pub mod planner;

pub use brief::BriefBuilder;
pub use pipeline::{Halt, Pipeline, PipelineReport};
pub use planner::{parse_sub_tasks, PlanError, SubTaskSpec};
