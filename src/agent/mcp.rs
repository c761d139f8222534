//! MCP client over streamable HTTP, exposed to the tool loop as a
//! [`ToolExecutor`].

use crate::llm::ToolSpec;
use anyhow::{Context, Result, anyhow};
use rmcp::model::{CallToolRequestParams, RawContent};
use rmcp::service::{RoleClient, RunningService};
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::ServiceExt;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

/// Outcome of one tool call as seen by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub text: String,
    pub is_error: bool,
}

/// Something that can list and run tools on the model's behalf.
pub trait ToolExecutor: Send + Sync {
    fn specs(&self) -> &[ToolSpec];

    fn execute<'a>(
        &'a self,
        name: &'a str,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput>> + Send + 'a>>;
}

type McpService = RunningService<RoleClient, ()>;

pub struct McpConnection {
    service: McpService,
    specs: Vec<ToolSpec>,
}

impl McpConnection {
    /// Connect, complete the MCP handshake and cache the tool catalogue.
    pub async fn connect_http(url: &str) -> Result<Self> {
        let transport = StreamableHttpClientTransport::from_uri(url.to_string());
        let service = ()
            .serve(transport)
            .await
            .with_context(|| format!("failed to connect MCP server at {url}"))?;

        let tools = service
            .list_all_tools()
            .await
            .with_context(|| format!("failed to list tools for MCP server at {url}"))?;

        let specs: Vec<ToolSpec> = tools
            .into_iter()
            .map(|tool| ToolSpec {
                name: tool.name.to_string(),
                description: tool.description.as_deref().unwrap_or_default().to_string(),
                parameters: Value::Object((*tool.input_schema).clone()),
            })
            .collect();

        tracing::info!(url, tools = specs.len(), "connected to MCP server");

        Ok(Self {
            service,
            specs,
        })
    }

    async fn call_tool(&self, tool_name: &str, args: Value) -> Result<ToolOutput> {
        let arguments = match args {
            Value::Object(object) => Some(object),
            Value::Null => None,
            _ => {
                return Err(anyhow!(
                    "MCP tool '{tool_name}' requires JSON object arguments"
                ));
            }
        };

        let request = CallToolRequestParams {
            meta: None,
            name: tool_name.to_string().into(),
            arguments,
            task: None,
        };

        let result = self
            .service
            .call_tool(request)
            .await
            .with_context(|| format!("MCP tool '{tool_name}' call failed"))?;

        let text = result
            .content
            .iter()
            .map(|content| match &content.raw {
                RawContent::Text(text) => text.text.clone(),
                RawContent::Image(image) => format!("[Image: {}]", image.mime_type),
                RawContent::Audio(audio) => format!("[Audio: {}]", audio.mime_type),
                RawContent::Resource(_) => "[Resource]".to_string(),
                RawContent::ResourceLink(link) => format!("[Resource: {}]", link.uri),
            })
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ToolOutput {
            text,
            is_error: result.is_error.unwrap_or(false),
        })
    }
}

impl ToolExecutor for McpConnection {
    fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    fn execute<'a>(
        &'a self,
        name: &'a str,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput>> + Send + 'a>> {
        Box::pin(self.call_tool(name, arguments))
    }
}
