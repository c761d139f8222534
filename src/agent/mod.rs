//! Tool-augmented agent: an MCP-backed tool loop over the generation model,
//! plus the once-initialized handle the pipeline shares across requests.

pub mod mcp;
pub mod tool_loop;
pub mod transcript;

pub use mcp::{McpConnection, ToolExecutor, ToolOutput};
pub use tool_loop::{LoopStopReason, ToolLoop, ToolLoopResult};
pub use transcript::{Transcript, TranscriptEntry};

use crate::config::AgentConfig;
use crate::error::PipelineError;
use crate::llm::{ContentBlock, MessageRole, Provider, ProviderMessage};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::OnceCell;

// ── Agent input ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: MessageRole,
    pub content: String,
}

/// `{ "messages": [{ "role": "user", "content": ... }] }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInput {
    pub messages: Vec<AgentMessage>,
}

impl AgentInput {
    pub fn from_user(content: impl Into<String>) -> Self {
        Self {
            messages: vec![AgentMessage {
                role: MessageRole::User,
                content: content.into(),
            }],
        }
    }

    fn into_provider_messages(self) -> Vec<ProviderMessage> {
        self.messages
            .into_iter()
            .map(|message| ProviderMessage {
                role: message.role,
                content: vec![ContentBlock::Text {
                    text: message.content,
                }],
            })
            .collect()
    }
}

// ── Traits ───────────────────────────────────────────────────────────────────

/// A reasoning service that may call tools before answering.
pub trait ToolAgent: Send + Sync {
    fn invoke<'a>(
        &'a self,
        input: AgentInput,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Transcript>> + Send + 'a>>;
}

/// Builds a connected [`ToolAgent`]. Called at most once per successful init.
pub trait AgentFactory: Send + Sync {
    fn connect(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<Arc<dyn ToolAgent>>> + Send + '_>>;
}

// ── MCP-backed agent ─────────────────────────────────────────────────────────

pub struct McpAgent {
    tool_loop: ToolLoop,
}

impl McpAgent {
    pub fn new(tool_loop: ToolLoop) -> Self {
        Self { tool_loop }
    }
}

impl ToolAgent for McpAgent {
    fn invoke<'a>(
        &'a self,
        input: AgentInput,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Transcript>> + Send + 'a>> {
        Box::pin(async move {
            let result = self.tool_loop.run(input.into_provider_messages()).await?;
            tracing::debug!(
                iterations = result.iterations,
                stop_reason = ?result.stop_reason,
                "agent run finished"
            );
            Ok(result.transcript)
        })
    }
}

/// Connects to the configured MCP server and wraps it in a tool loop.
pub struct McpAgentFactory {
    provider: Arc<dyn Provider>,
    mcp_url: String,
    model: String,
    max_iterations: u32,
}

impl McpAgentFactory {
    pub fn new(provider: Arc<dyn Provider>, config: &AgentConfig, default_model: &str) -> Self {
        Self {
            provider,
            mcp_url: config.mcp_url.clone(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| default_model.to_string()),
            max_iterations: config.max_iterations,
        }
    }
}

impl AgentFactory for McpAgentFactory {
    fn connect(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<Arc<dyn ToolAgent>>> + Send + '_>> {
        Box::pin(async move {
            let connection = McpConnection::connect_http(&self.mcp_url).await?;
            let tool_loop = ToolLoop::new(
                Arc::clone(&self.provider),
                Arc::new(connection),
                self.model.clone(),
                0.0,
                self.max_iterations,
            );
            Ok(Arc::new(McpAgent::new(tool_loop)) as Arc<dyn ToolAgent>)
        })
    }
}

// ── Shared handle ────────────────────────────────────────────────────────────

/// Lazily-connected agent shared by every request.
///
/// Concurrent first callers wait on a single initializer. A failed
/// initialization leaves the cell empty so the next caller tries again.
pub struct AgentCell {
    factory: Arc<dyn AgentFactory>,
    cell: OnceCell<Arc<dyn ToolAgent>>,
}

impl AgentCell {
    pub fn new(factory: Arc<dyn AgentFactory>) -> Self {
        Self {
            factory,
            cell: OnceCell::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    pub async fn get_or_init(&self) -> Result<Arc<dyn ToolAgent>, PipelineError> {
        self.cell
            .get_or_try_init(|| async {
                tracing::info!("initializing tool agent");
                self.factory.connect().await.map_err(|e| {
                    tracing::warn!("agent initialization failed: {e:#}");
                    PipelineError::AgentInit(format!("{e:#}"))
                })
            })
            .await
            .map(Arc::clone)
    }
}
