use super::prompt::ComposedPrompt;
use crate::llm::Provider;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationResult {
    Text(String),
    Error(String),
}

/// Aborts the worker if the awaiting request is dropped mid-call.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Calls the generation model on its own spawned task.
pub struct GenerationInvoker {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f64,
}

impl GenerationInvoker {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, temperature: f64) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
        }
    }

    /// Never fails: every error, including a worker panic, becomes
    /// [`GenerationResult::Error`].
    pub async fn generate(&self, prompt: &ComposedPrompt) -> GenerationResult {
        let provider = Arc::clone(&self.provider);
        let model = self.model.clone();
        let temperature = self.temperature;
        let prompt = prompt.as_str().to_owned();

        let mut worker = AbortOnDrop(tokio::spawn(async move {
            provider
                .chat_with_system(None, &prompt, &model, temperature)
                .await
        }));

        match (&mut worker.0).await {
            Ok(Ok(text)) => GenerationResult::Text(text),
            Ok(Err(e)) => GenerationResult::Error(format!("{e:#}")),
            Err(join_error) if join_error.is_panic() => {
                GenerationResult::Error("generation worker panicked".into())
            }
            Err(_) => GenerationResult::Error("generation worker was cancelled".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ProviderMessage, ProviderResponse, ToolSpec};
    use crate::pipeline::{PromptComposer, Request};
    use std::future::Future;
    use std::pin::Pin;

    enum Behaviour {
        Echo,
        Fail,
        Panic,
    }

    struct FakeProvider(Behaviour);

    impl Provider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        fn chat_with_system<'a>(
            &'a self,
            _system_prompt: Option<&'a str>,
            message: &'a str,
            _model: &'a str,
            _temperature: f64,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
            Box::pin(async move {
                match self.0 {
                    Behaviour::Echo => Ok(format!("echo: {}", message.len())),
                    Behaviour::Fail => anyhow::bail!("quota exceeded"),
                    Behaviour::Panic => panic!("provider bug"),
                }
            })
        }

        fn chat_with_tools<'a>(
            &'a self,
            _system_prompt: Option<&'a str>,
            _messages: &'a [ProviderMessage],
            _tools: &'a [ToolSpec],
            _model: &'a str,
            _temperature: f64,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<ProviderResponse>> + Send + 'a>> {
            Box::pin(async { anyhow::bail!("not used") })
        }
    }

    fn prompt() -> ComposedPrompt {
        PromptComposer::new("sys").compose(&Request::new("hi").unwrap(), &[])
    }

    async fn generate_with(behaviour: Behaviour) -> GenerationResult {
        GenerationInvoker::new(Arc::new(FakeProvider(behaviour)), "m", 0.2)
            .generate(&prompt())
            .await
    }

    #[tokio::test]
    async fn returns_provider_text() {
        let expected = format!("echo: {}", prompt().as_str().len());
        assert_eq!(
            generate_with(Behaviour::Echo).await,
            GenerationResult::Text(expected)
        );
    }

    #[tokio::test]
    async fn provider_error_becomes_error_variant() {
        assert_eq!(
            generate_with(Behaviour::Fail).await,
            GenerationResult::Error("quota exceeded".into())
        );
    }

    #[tokio::test]
    async fn worker_panic_becomes_error_variant() {
        assert_eq!(
            generate_with(Behaviour::Panic).await,
            GenerationResult::Error("generation worker panicked".into())
        );
    }
}
