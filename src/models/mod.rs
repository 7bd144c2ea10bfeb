//! Data layer: the persisted task DAG.

pub mod dependency;
pub mod task;

pub use dependency::TaskDependency;
pub use task::{NewTask, Task, TaskStatus};
