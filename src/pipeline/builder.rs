use super::{GenerationInvoker, Orchestrator, PromptComposer};
use crate::agent::{AgentCell, McpAgentFactory};
use crate::config::Config;
use crate::context::{AgentBinding, ContextAggregator, relevance, state_store};
use crate::guardrail::{AirsScanner, Scanner};
use crate::llm::{GeminiProvider, Provider};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Wire every pipeline component from a validated config.
pub fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    config.validate()?;

    let scanner: Arc<dyn Scanner> =
        Arc::new(AirsScanner::new(&config.guardrail).context("guardrail scanner")?);
    let provider: Arc<dyn Provider> =
        Arc::new(GeminiProvider::new(&config.generation).context("generation provider")?);

    let store = state_store::from_config(&config.state_store).context("state store")?;

    let agent = config.agent.enabled.then(|| AgentBinding {
        cell: Arc::new(AgentCell::new(Arc::new(McpAgentFactory::new(
            Arc::clone(&provider),
            &config.agent,
            &config.generation.model,
        )))),
        relevance: relevance::from_config(&config.agent),
        required: config.agent.required,
    });

    tracing::debug!(
        state_store = store.is_some(),
        agent = agent.is_some(),
        model = %config.generation.model,
        "pipeline components built"
    );

    Ok(Orchestrator::new(
        scanner,
        ContextAggregator::new(store, agent),
        PromptComposer::new(config.prompt.system_instructions.clone()),
        GenerationInvoker::new(
            provider,
            config.generation.model.clone(),
            config.generation.temperature,
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StateStoreBackend;
    use crate::context::ContextSource;
    use crate::pipeline::{EventSink, Request};

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.generation.api_key = Some("gem".into());
        config.guardrail.api_key = Some("pan".into());
        config.guardrail.profile_name = Some("profile".into());
        config
    }

    #[test]
    fn rejects_config_without_secrets() {
        assert!(build_orchestrator(&Config::default()).is_err());
    }

    #[tokio::test]
    async fn missing_store_host_degrades_instead_of_failing_startup() {
        let orchestrator = build_orchestrator(&valid_config()).unwrap();
        let request = Request::new("hello").unwrap();

        let context = orchestrator
            .aggregator()
            .aggregate(&request, &EventSink::null())
            .await
            .unwrap();

        assert!(context.fatal.is_none());
        assert_eq!(context.fragments.len(), 1);
        let fragment = &context.fragments[0];
        assert_eq!(fragment.source, ContextSource::StateStore);
        assert!(!fragment.ok);
        assert!(fragment.text.contains("AWS_DB_HOST"));
    }

    #[tokio::test]
    async fn builds_with_sqlite_store_and_agent() {
        let mut config = valid_config();
        config.state_store.backend = StateStoreBackend::Sqlite {
            path: "/nonexistent/state.db".into(),
        };
        let orchestrator = build_orchestrator(&config).unwrap();
        let cell = orchestrator.aggregator().agent_cell().unwrap();
        assert!(!cell.is_initialized());
    }
}
