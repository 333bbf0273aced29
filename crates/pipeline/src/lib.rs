//! Request processing pipeline.
//!
//! - [`preprocess`] -- spatial filtering and subsampling of RGB/thermal
//!   image pairs before submission.
//! - [`processor`] -- remote task lifecycle: create or adopt, monitor,
//!   collect and upload results, cancel, list and clean up.
//! - [`service`] -- command-level entry points returning process exit codes.

pub mod error;
pub mod preprocess;
pub mod processor;
pub mod service;

pub use error::PipelineError;
pub use preprocess::{PreprocessSummary, Preprocessor};
pub use processor::{ProcessOutcome, Processor};
pub use service::{ExitCode, ProcessArgs, ProcessingService};
