#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Taskflow Core
//!
//! Persistent, DAG-structured task execution engine for multi-step
//! evaluation pipelines.
//!
//! ## Overview
//!
//! Flows are persisted as `Task` nodes joined by `TaskDependency` edges. A
//! [`Scheduler`] batch run repeatedly finds tasks whose dependencies are
//! terminal, dispatches them to pluggable handlers resolved through a
//! [`RunnerRegistry`], and loops to a fixed point. Handlers whose work runs
//! on an external batch facility use the two-phase submit/collect pattern
//! in [`runner::two_phase`]; dead subgraphs are reclaimed on demand by the
//! [`GarbageCollector`].
//!
//! ## Module Organization
//!
//! - [`models`] - Persisted task DAG (nodes, edges, status transitions)
//! - [`database`] - Store connections and schema
//! - [`registry`] - Handler name resolution
//! - [`runner`] - Handler contract, shared dispatch path, two-phase pattern
//! - [`runners`] - Shipped handlers (scoring, median aggregation, threshold gate)
//! - [`scheduler`] - Readiness loop and run summaries
//! - [`gc`] - Orphaned-subgraph collection
//! - [`config`] / [`error`] / [`logging`] - Ambient concerns
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use taskflow_core::{
//!     database, EngineConfig, InMemoryFacility, NewTask, RunnerRegistry, Scheduler, Task,
//! };
//!
//! # async fn example() -> taskflow_core::Result<()> {
//! let config = EngineConfig::from_env()?;
//! let pool = database::connect(&config).await?;
//!
//! // A two-level flow: one scoring request feeding a threshold gate.
//! let score = Task::create(&pool, NewTask {
//!     handler_name: "score_request".into(),
//!     payload: json!({"input": "essay text"}),
//! }).await?;
//! Task::create_with_dependencies(&pool, NewTask {
//!     handler_name: "threshold_gate".into(),
//!     payload: json!({"threshold": 0.5}),
//! }, &[score.id]).await?;
//!
//! let registry = Arc::new(RunnerRegistry::with_builtin_runners());
//! let facility = Arc::new(InMemoryFacility::new());
//! let scheduler = Scheduler::with_config(pool, registry, facility, &config);
//!
//! let summary = scheduler.run_batch().await?;
//! println!("executed {} tasks in {} passes", summary.executed, summary.passes);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod gc;
pub mod logging;
pub mod models;
pub mod registry;
pub mod runner;
pub mod runners;
pub mod scheduler;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use gc::GarbageCollector;
pub use logging::init_logging;
pub use models::{NewTask, Task, TaskDependency, TaskStatus};
pub use registry::{RunnerFactory, RunnerRegistry};
pub use runner::two_phase::{ExternalFacility, FetchOutcome, InMemoryFacility};
pub use runner::{initiate_task, Execution, InitiationOutcome, Runner, RunnerContext};
pub use scheduler::{RunSummary, Scheduler};
