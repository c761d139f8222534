//! Optional prompt context: a state-store snapshot and a tool-agent answer.

pub mod fragment;
pub mod relevance;
pub mod state_store;

pub use fragment::{ContextFragment, ContextSource};
pub use relevance::{AlwaysRelevant, KeywordRelevance, RelevancePredicate};
pub use state_store::{NO_STATE_FOUND, PostgresStateStore, SqliteStateStore, StateStore};

use crate::agent::{AgentCell, AgentInput};
use crate::error::PipelineError;
use crate::pipeline::events::{Disconnected, EventSink, StreamEvent};
use crate::pipeline::request::Request;
use std::sync::Arc;

/// Fragments gathered for one request, plus the fatal error that ended
/// aggregation early, if any.
#[derive(Debug, Default)]
pub struct ContextOutcome {
    pub fragments: Vec<ContextFragment>,
    pub fatal: Option<PipelineError>,
}

/// Agent wiring: the shared handle, when to call it, and whether its failure
/// fails the request.
pub struct AgentBinding {
    pub cell: Arc<AgentCell>,
    pub relevance: Arc<dyn RelevancePredicate>,
    pub required: bool,
}

pub struct ContextAggregator {
    state_store: Option<Arc<dyn StateStore>>,
    agent: Option<AgentBinding>,
}

impl ContextAggregator {
    pub fn new(state_store: Option<Arc<dyn StateStore>>, agent: Option<AgentBinding>) -> Self {
        Self { state_store, agent }
    }

    /// The shared agent handle, for warm-up at startup.
    pub fn agent_cell(&self) -> Option<&Arc<AgentCell>> {
        self.agent.as_ref().map(|binding| &binding.cell)
    }

    /// Gather context for `request`, narrating progress on `sink`.
    ///
    /// State-store failures degrade to a failed fragment. Agent failures are
    /// returned in [`ContextOutcome::fatal`] when they must stop the request.
    pub async fn aggregate(
        &self,
        request: &Request,
        sink: &EventSink,
    ) -> Result<ContextOutcome, Disconnected> {
        let mut outcome = ContextOutcome::default();

        if let Some(store) = &self.state_store {
            outcome
                .fragments
                .push(self.fetch_state(store.as_ref(), sink).await?);
        }

        if let Some(binding) = &self.agent {
            if binding.relevance.is_relevant(request.text()) {
                match self.consult_agent(binding, request, sink).await? {
                    Ok(fragment) => outcome.fragments.push(fragment),
                    Err(error) => outcome.fatal = Some(error),
                }
            } else {
                sink.log("Request does not need the MCP agent; skipping it.")
                    .await?;
            }
        }

        Ok(outcome)
    }

    async fn fetch_state(
        &self,
        store: &dyn StateStore,
        sink: &EventSink,
    ) -> Result<ContextFragment, Disconnected> {
        sink.log(format!("Fetching current state from {}...", store.name()))
            .await?;

        match sink.until_closed(store.fetch_rows()).await? {
            Ok(rows) => {
                tracing::debug!(rows = rows.len(), "state store fetched");
                sink.log("State fetched.").await?;
                Ok(ContextFragment::ok(
                    ContextSource::StateStore,
                    state_store::render_rows(&rows),
                ))
            }
            Err(e) => {
                let error = PipelineError::ContextFetch {
                    source_name: store.name(),
                    message: crate::llm::sanitize_api_error(&format!("{e:#}")),
                };
                tracing::warn!("{error}");
                sink.log(format!("{error}; continuing without state."))
                    .await?;
                Ok(ContextFragment::failed(
                    ContextSource::StateStore,
                    error.to_string(),
                ))
            }
        }
    }

    async fn consult_agent(
        &self,
        binding: &AgentBinding,
        request: &Request,
        sink: &EventSink,
    ) -> Result<Result<ContextFragment, PipelineError>, Disconnected> {
        let first_use = !binding.cell.is_initialized();
        if first_use {
            sink.log("Connecting to MCP server...").await?;
        }

        let agent = match sink.until_closed(binding.cell.get_or_init()).await? {
            Ok(agent) => agent,
            Err(error) => return Ok(Err(error)),
        };
        if first_use {
            sink.log("Connected to MCP server and agent initialized.")
                .await?;
        }

        sink.log("Streaming MCP agent response...").await?;
        let input = AgentInput::from_user(request.text());

        match sink.until_closed(agent.invoke(input)).await? {
            Ok(transcript) => {
                let lines = transcript.lines();
                for line in &lines {
                    sink.emit(StreamEvent::mcp(line.clone())).await?;
                }
                Ok(Ok(ContextFragment::ok(ContextSource::Agent, lines.join("\n"))))
            }
            Err(e) => {
                let error = PipelineError::AgentInvocation(format!("{e:#}"));
                if binding.required {
                    return Ok(Err(error));
                }
                tracing::warn!("{error}");
                sink.log(format!("{error}; continuing without agent context."))
                    .await?;
                Ok(Ok(ContextFragment::failed(
                    ContextSource::Agent,
                    error.to_string(),
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentFactory, ToolAgent, Transcript, TranscriptEntry};
    use std::future::Future;
    use std::pin::Pin;

    struct StaticStore(Result<Vec<String>, String>);

    impl StateStore for StaticStore {
        fn name(&self) -> &'static str {
            "static"
        }

        fn fetch_rows(
            &self,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<String>>> + Send + '_>> {
            let result = self.0.clone().map_err(|message| anyhow::anyhow!(message));
            Box::pin(async move { result })
        }
    }

    struct LinesAgent(Result<Vec<&'static str>, &'static str>);

    impl ToolAgent for LinesAgent {
        fn invoke<'a>(
            &'a self,
            _input: AgentInput,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<Transcript>> + Send + 'a>> {
            Box::pin(async move {
                match &self.0 {
                    Ok(lines) => Ok(Transcript::new(
                        lines
                            .iter()
                            .map(|line| TranscriptEntry::Assistant((*line).to_string()))
                            .collect(),
                    )),
                    Err(message) => Err(anyhow::anyhow!(*message)),
                }
            })
        }
    }

    struct ReadyFactory(Arc<dyn ToolAgent>);

    impl AgentFactory for ReadyFactory {
        fn connect(
            &self,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<Arc<dyn ToolAgent>>> + Send + '_>> {
            let agent = Arc::clone(&self.0);
            Box::pin(async move { Ok(agent) })
        }
    }

    fn binding(agent: LinesAgent, required: bool) -> AgentBinding {
        AgentBinding {
            cell: Arc::new(AgentCell::new(Arc::new(ReadyFactory(Arc::new(agent))))),
            relevance: Arc::new(KeywordRelevance::new(["terraform"])),
            required,
        }
    }

    async fn run(
        aggregator: &ContextAggregator,
        text: &str,
    ) -> (ContextOutcome, Vec<StreamEvent>) {
        let (sink, mut rx) = EventSink::channel();
        let request = Request::new(text).unwrap();
        let collector = tokio::spawn(async move {
            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }
            events
        });
        let outcome = aggregator.aggregate(&request, &sink).await.unwrap();
        drop(sink);
        (outcome, collector.await.unwrap())
    }

    #[tokio::test]
    async fn store_failure_is_logged_not_fatal() {
        let aggregator = ContextAggregator::new(
            Some(Arc::new(StaticStore(Err("connection refused".into())))),
            Some(binding(LinesAgent(Ok(vec!["use aws 5.x"])), true)),
        );

        let (outcome, events) = run(&aggregator, "terraform aws provider?").await;
        assert!(outcome.fatal.is_none());
        assert_eq!(outcome.fragments.len(), 2);
        assert!(!outcome.fragments[0].ok);
        assert!(outcome.fragments[1].ok);
        assert!(events.iter().all(|event| event.kind() != "error"));
        assert!(
            events
                .iter()
                .any(|event| event.text().contains("static query failed: connection refused"))
        );
    }

    #[tokio::test]
    async fn empty_store_yields_sentinel_fragment() {
        let aggregator =
            ContextAggregator::new(Some(Arc::new(StaticStore(Ok(vec![])))), None);
        let (outcome, _) = run(&aggregator, "hello").await;
        assert_eq!(
            outcome.fragments,
            vec![ContextFragment::ok(ContextSource::StateStore, NO_STATE_FOUND)]
        );
    }

    #[tokio::test]
    async fn agent_lines_stream_as_mcp_events() {
        let aggregator = ContextAggregator::new(
            None,
            Some(binding(LinesAgent(Ok(vec!["line one", "line two"])), true)),
        );
        let (outcome, events) = run(&aggregator, "Terraform modules").await;

        let mcp: Vec<&str> = events
            .iter()
            .filter(|event| event.kind() == "mcp")
            .map(StreamEvent::text)
            .collect();
        assert_eq!(mcp, ["[assistant] line one", "[assistant] line two"]);
        assert_eq!(
            outcome.fragments[0].text,
            "[assistant] line one\n[assistant] line two"
        );
    }

    #[tokio::test]
    async fn irrelevant_request_skips_agent() {
        let aggregator = ContextAggregator::new(
            None,
            Some(binding(LinesAgent(Err("should not run")), true)),
        );
        let (outcome, events) = run(&aggregator, "hello").await;
        assert!(outcome.fatal.is_none());
        assert!(outcome.fragments.is_empty());
        assert!(events.iter().all(|event| event.kind() == "log"));
    }

    #[tokio::test]
    async fn required_agent_failure_is_fatal() {
        let aggregator = ContextAggregator::new(
            None,
            Some(binding(LinesAgent(Err("tool server crashed")), true)),
        );
        let (outcome, _) = run(&aggregator, "terraform").await;
        assert!(matches!(
            outcome.fatal,
            Some(PipelineError::AgentInvocation(ref msg)) if msg.contains("tool server crashed")
        ));
    }

    #[tokio::test]
    async fn optional_agent_failure_degrades() {
        let aggregator = ContextAggregator::new(
            None,
            Some(binding(LinesAgent(Err("tool server crashed")), false)),
        );
        let (outcome, events) = run(&aggregator, "terraform").await;
        assert!(outcome.fatal.is_none());
        assert!(!outcome.fragments[0].ok);
        assert!(events.iter().all(|event| event.kind() == "log"));
    }
}
