//! Pipeline construction and execution for Conduit.
//!
//! A pipeline is a linear chain `source → filter* → target?` where every
//! stage is a separate plugin process. [`PipelineBuilder`] turns free-form
//! command tokens into a normalised [`Pipeline`], consulting the plugin
//! [`Registry`](conduit_plugins::Registry). [`Engine`] then runs the chain
//! with stdout of each stage wired directly to stdin of the next, so records
//! stream through the operating system's pipe buffers and backpressure is
//! handled by the kernel. [`Aggregator`] runs several single-source
//! pipelines one after another into a single labelled stream.
//!
//! # Example
//!
//! ```rust,no_run
//! use conduit_pipeline::{BuildOptions, Consumption, Engine, ExecutionOptions, PipelineBuilder};
//! use conduit_plugins::{PluginCatalog, Registry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = PluginCatalog::new();
//! let registry = Registry::with_defaults(&catalog);
//! let builder = PipelineBuilder::new(&registry, BuildOptions::default());
//! let pipeline = builder.build(&["people.csv", "select(.age > 30)", "adults.json"])?;
//!
//! let engine = Engine::new(&catalog, ExecutionOptions::default());
//! let mut stdout = std::io::stdout().lock();
//! let result = engine.execute(&pipeline, Consumption::All, &mut stdout)?;
//! assert!(result.is_success());
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod builder;
pub mod classify;
pub mod engine;
pub mod error;
pub mod model;

pub use self::aggregate::{AggregateReport, Aggregator, SourceOutcome, SourceReport, SourceSpec};
pub use self::builder::{BuildOptions, PipelineBuilder};
pub use self::classify::{Candidate, ClassifyContext, TokenClass};
pub use self::engine::{
    Consumption, Engine, ExecutionOptions, ExecutionResult, KillReason, StageOutcome,
    StageReport, StageState,
};
pub use self::error::PipelineError;
pub use self::model::{ConfigValue, Pipeline, PipelineStep, StageKind, StepIo};
