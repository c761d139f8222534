#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::unnecessary_literal_bound,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod agent;
pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod guardrail;
pub mod llm;
pub mod pipeline;

pub use config::Config;
pub use error::PipelineError;
pub use pipeline::{Orchestrator, PipelineOutcome, Request, StreamEvent, build_orchestrator};
