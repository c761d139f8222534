//! Per-request state machine:
//! `Idle → ScanningInput → AggregatingContext → Composing → Generating →
//! ScanningOutput → Completed`, leaving for `Blocked` on any failure.

use super::events::{Disconnected, EventSink, StreamEvent};
use super::generation::{GenerationInvoker, GenerationResult};
use super::prompt::PromptComposer;
use super::request::Request;
use crate::context::ContextAggregator;
use crate::error::PipelineError;
use crate::guardrail::{ScanVerdict, Scanner, evaluate};
use std::fmt;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    ScanningInput,
    AggregatingContext,
    Composing,
    Generating,
    ScanningOutput,
    Blocked,
    Completed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::ScanningInput => "scanning_input",
            Self::AggregatingContext => "aggregating_context",
            Self::Composing => "composing",
            Self::Generating => "generating",
            Self::ScanningOutput => "scanning_output",
            Self::Blocked => "blocked",
            Self::Completed => "completed",
        })
    }
}

/// How one run ended. Exactly one per request.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    Completed {
        response: String,
        input_verdict: ScanVerdict,
        output_verdict: ScanVerdict,
    },
    Failed(PipelineError),
    /// The caller went away before a terminal event could be delivered.
    Cancelled,
}

/// Which side of the model a scan guards.
#[derive(Debug, Clone, Copy)]
enum ScanStage {
    Input,
    Output,
}

impl ScanStage {
    fn progress(self) -> &'static str {
        match self {
            Self::Input => "Scanning input via guardrail...",
            Self::Output => "Scanning model output via guardrail...",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

/// Ties scanner, context, composer and generator together for one request
/// at a time. Shared across requests behind an `Arc`.
pub struct Orchestrator {
    scanner: Arc<dyn Scanner>,
    aggregator: ContextAggregator,
    composer: PromptComposer,
    invoker: GenerationInvoker,
}

impl Orchestrator {
    pub fn new(
        scanner: Arc<dyn Scanner>,
        aggregator: ContextAggregator,
        composer: PromptComposer,
        invoker: GenerationInvoker,
    ) -> Self {
        Self {
            scanner,
            aggregator,
            composer,
            invoker,
        }
    }

    pub fn aggregator(&self) -> &ContextAggregator {
        &self.aggregator
    }

    /// Run one request to a terminal outcome.
    ///
    /// Every stage transition emits at least one event; a failure emits one
    /// `error` event and nothing after it. When the sink disconnects the run
    /// stops at the next await and returns [`PipelineOutcome::Cancelled`].
    pub async fn run(&self, request: &Request, sink: &EventSink) -> PipelineOutcome {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("pipeline", %request_id);

        async {
            let outcome = match self.drive(request, sink).await {
                Ok(Ok(completed)) => completed,
                Ok(Err(error)) => match self.fail(error, sink).await {
                    Ok(outcome) => outcome,
                    Err(Disconnected) => PipelineOutcome::Cancelled,
                },
                Err(Disconnected) => PipelineOutcome::Cancelled,
            };

            match &outcome {
                PipelineOutcome::Completed { .. } => tracing::info!("request completed"),
                PipelineOutcome::Failed(error) => {
                    tracing::info!(kind = error.kind(), "request ended: {error}");
                }
                PipelineOutcome::Cancelled => tracing::info!("caller disconnected"),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    /// Happy path. The inner `Err` is the pipeline error that ended the run;
    /// the outer one means the caller is gone.
    async fn drive(
        &self,
        request: &Request,
        sink: &EventSink,
    ) -> Result<Result<PipelineOutcome, PipelineError>, Disconnected> {
        let mut state = PipelineState::Idle;

        transition(&mut state, PipelineState::ScanningInput);
        let input_verdict = match self.scan(request.text(), ScanStage::Input, sink).await? {
            Ok(verdict) => verdict,
            Err(error) => return Ok(Err(blocked(&mut state, error))),
        };

        transition(&mut state, PipelineState::AggregatingContext);
        sink.log("Gathering context...").await?;
        let context = self.aggregator.aggregate(request, sink).await?;
        if let Some(error) = context.fatal {
            return Ok(Err(blocked(&mut state, error)));
        }

        transition(&mut state, PipelineState::Composing);
        let prompt = self.composer.compose(request, &context.fragments);
        sink.log("Composing prompt...").await?;

        transition(&mut state, PipelineState::Generating);
        sink.log("Generating LLM response...").await?;
        let generated = match sink.until_closed(self.invoker.generate(&prompt)).await? {
            GenerationResult::Text(text) => text,
            GenerationResult::Error(message) => {
                return Ok(Err(blocked(&mut state, PipelineError::Generation(message))));
            }
        };

        transition(&mut state, PipelineState::ScanningOutput);
        let output_verdict = match self.scan(&generated, ScanStage::Output, sink).await? {
            Ok(verdict) => verdict,
            Err(error) => return Ok(Err(blocked(&mut state, error))),
        };

        transition(&mut state, PipelineState::Completed);
        sink.emit(StreamEvent::Gemini {
            text: generated.clone(),
        })
        .await?;

        Ok(Ok(PipelineOutcome::Completed {
            response: generated,
            input_verdict,
            output_verdict,
        }))
    }

    /// Scan `text` and apply the policy. A transport error and an unsafe
    /// decision both end the run; only the latter carries a verdict.
    async fn scan(
        &self,
        text: &str,
        stage: ScanStage,
        sink: &EventSink,
    ) -> Result<Result<ScanVerdict, PipelineError>, Disconnected> {
        sink.log(stage.progress()).await?;

        let verdict = match sink.until_closed(self.scanner.scan(text)).await? {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(stage = stage.label(), "guardrail scan failed: {e}");
                return Ok(Err(PipelineError::from(e)));
            }
        };

        let decision = evaluate(&verdict);
        tracing::debug!(
            stage = stage.label(),
            safe = decision.safe,
            reason = %decision.reason,
            "guardrail decision"
        );
        if decision.safe {
            Ok(Ok(verdict))
        } else {
            Ok(Err(PipelineError::policy_block(decision.reason, verdict)))
        }
    }

    async fn fail(
        &self,
        error: PipelineError,
        sink: &EventSink,
    ) -> Result<PipelineOutcome, Disconnected> {
        sink.emit(StreamEvent::Error {
            text: error.to_string(),
            verdict: error.verdict().cloned(),
        })
        .await?;
        Ok(PipelineOutcome::Failed(error))
    }
}

fn transition(state: &mut PipelineState, next: PipelineState) {
    tracing::debug!(from = %state, to = %next, "pipeline transition");
    *state = next;
}

fn blocked(state: &mut PipelineState, error: PipelineError) -> PipelineError {
    transition(state, PipelineState::Blocked);
    error
}
