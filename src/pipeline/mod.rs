//! The guarded generation pipeline: request in, ordered events and one
//! terminal outcome out.

pub mod builder;
pub mod events;
pub mod generation;
pub mod orchestrator;
pub mod prompt;
pub mod request;

pub use builder::build_orchestrator;
pub use events::{Disconnected, EventSink, StreamEvent};
pub use generation::{GenerationInvoker, GenerationResult};
pub use orchestrator::{Orchestrator, PipelineOutcome, PipelineState};
pub use prompt::{ComposedPrompt, PromptComposer};
pub use request::Request;
