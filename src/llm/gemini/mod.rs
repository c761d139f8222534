//! Google Gemini `generateContent` provider.
//!
//! Results are resolved to plain text (or typed tool calls) here, so nothing
//! downstream ever inspects the raw response shape.

use crate::config::GenerationConfig;
use crate::llm::{
    build_provider_client, sanitize_api_error, scrub_secret_patterns,
    traits::Provider,
    types::{ContentBlock, MessageRole, ProviderMessage, ProviderResponse, StopReason, ToolSpec},
};
use reqwest::Client;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

mod types;
use types::{
    Candidate, Content, FunctionCall, FunctionDeclaration, FunctionResponse, GeminiTool,
    GenerateContentRequest, GenerateContentResponse, GenerationSettings, Part, ResponsePart,
};

pub struct GeminiProvider {
    api_key: String,
    base_url: String,
    max_output_tokens: u32,
    client: Client,
}

impl GeminiProvider {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Gemini API key not found. Set GEMINI_API_KEY or generation.api_key"
                )
            })?;

        Ok(Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_output_tokens: config.max_output_tokens,
            client: build_provider_client(),
        })
    }

    fn model_name(model: &str) -> String {
        if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        }
    }

    fn generation_settings(&self, temperature: f64) -> GenerationSettings {
        GenerationSettings {
            temperature,
            max_output_tokens: self.max_output_tokens,
        }
    }

    fn system_content(system_prompt: Option<&str>) -> Option<Content> {
        system_prompt.map(|system| Content {
            role: None,
            parts: vec![Part::text(system.to_string())],
        })
    }

    fn build_request(
        &self,
        system_prompt: Option<&str>,
        message: &str,
        temperature: f64,
    ) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part::text(message.to_string())],
            }],
            system_instruction: Self::system_content(system_prompt),
            tools: None,
            generation_config: self.generation_settings(temperature),
        }
    }

    fn build_tools_request(
        &self,
        system_prompt: Option<&str>,
        messages: &[ProviderMessage],
        tools: &[ToolSpec],
        temperature: f64,
    ) -> GenerateContentRequest {
        let tool_id_to_name: HashMap<&str, &str> = messages
            .iter()
            .flat_map(|message| message.content.iter())
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, .. } => Some((id.as_str(), name.as_str())),
                ContentBlock::Text { .. } | ContentBlock::ToolResult { .. } => None,
            })
            .collect();

        let tools = (!tools.is_empty()).then(|| {
            vec![GeminiTool {
                function_declarations: tools
                    .iter()
                    .map(|tool| FunctionDeclaration {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.parameters.clone(),
                    })
                    .collect(),
            }]
        });

        GenerateContentRequest {
            contents: messages
                .iter()
                .map(|message| Self::map_message(message, &tool_id_to_name))
                .collect(),
            system_instruction: Self::system_content(system_prompt),
            tools,
            generation_config: self.generation_settings(temperature),
        }
    }

    fn map_message(message: &ProviderMessage, tool_id_to_name: &HashMap<&str, &str>) -> Content {
        let role = match message.role {
            MessageRole::Assistant => "model",
            MessageRole::User => "user",
        };

        let parts = message
            .content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => Part::text(text.clone()),
                ContentBlock::ToolUse { id, name, input } => Part::function_call(FunctionCall {
                    name: name.clone(),
                    args: as_object(input.clone()),
                    id: Some(id.clone()),
                }),
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => Part::function_response(FunctionResponse {
                    name: tool_id_to_name
                        .get(tool_use_id.as_str())
                        .map_or_else(|| "tool".to_string(), |name| (*name).to_string()),
                    response: json!({
                        "content": content,
                        "is_error": is_error,
                    }),
                }),
            })
            .collect();

        Content {
            role: Some(role),
            parts,
        }
    }

    async fn call_api(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> anyhow::Result<GenerateContentResponse> {
        let url = format!(
            "{}/v1beta/{}:generateContent",
            self.base_url,
            Self::model_name(model)
        );

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{}", sanitize_api_error(&e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Gemini API error ({status}): {}",
                sanitize_api_error(&error_text)
            );
        }

        let result: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("malformed Gemini response: {e}"))?;

        if let Some(err) = result.error.as_ref() {
            anyhow::bail!("Gemini API error: {}", sanitize_api_error(&err.message));
        }

        Ok(result)
    }

    fn first_candidate(result: &GenerateContentResponse) -> anyhow::Result<&Candidate> {
        if let Some(reason) = result
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_deref())
        {
            anyhow::bail!("Gemini refused the prompt: {reason}");
        }

        result
            .candidates
            .as_ref()
            .and_then(|candidates| candidates.first())
            .ok_or_else(|| anyhow::anyhow!("No response from Gemini"))
    }

    /// Joined text parts of the first candidate.
    fn extract_text(result: &GenerateContentResponse) -> anyhow::Result<String> {
        let candidate = Self::first_candidate(result)?;
        let text = candidate
            .content
            .as_ref()
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        if text.is_empty() {
            anyhow::bail!("No response from Gemini");
        }
        Ok(text)
    }

    fn parse_content_blocks(parts: &[ResponsePart]) -> Vec<ContentBlock> {
        let mut blocks = Vec::new();
        let mut call_index = 1usize;

        for part in parts {
            if let Some(text) = part.text.as_deref().filter(|t| !t.is_empty()) {
                blocks.push(ContentBlock::Text {
                    text: text.to_string(),
                });
            }

            if let Some(call) = &part.function_call {
                let id = call
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("gemini_call_{call_index}"));
                call_index += 1;
                blocks.push(ContentBlock::ToolUse {
                    id,
                    name: call.name.clone(),
                    input: as_object(call.args.clone()),
                });
            }
        }

        blocks
    }

    fn map_stop_reason(candidate: &Candidate, blocks: &[ContentBlock]) -> StopReason {
        if blocks
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolUse { .. }))
        {
            return StopReason::ToolUse;
        }

        match candidate.finish_reason.as_deref() {
            Some("STOP") => StopReason::EndTurn,
            Some("MAX_TOKENS") => StopReason::MaxTokens,
            Some(_) | None => StopReason::Error,
        }
    }
}

/// Gemini requires function arguments to be a JSON object.
fn as_object(value: Value) -> Value {
    if value.is_object() {
        value
    } else if value.is_null() {
        Value::Object(Map::new())
    } else {
        let mut wrapped = Map::new();
        wrapped.insert("input".to_string(), value);
        Value::Object(wrapped)
    }
}

impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn chat_with_system<'a>(
        &'a self,
        system_prompt: Option<&'a str>,
        message: &'a str,
        model: &'a str,
        temperature: f64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let request = self.build_request(system_prompt, message, temperature);
            let result = self.call_api(model, &request).await?;
            Self::extract_text(&result)
        })
    }

    fn chat_with_tools<'a>(
        &'a self,
        system_prompt: Option<&'a str>,
        messages: &'a [ProviderMessage],
        tools: &'a [ToolSpec],
        model: &'a str,
        temperature: f64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ProviderResponse>> + Send + 'a>> {
        Box::pin(async move {
            let request = self.build_tools_request(system_prompt, messages, tools, temperature);
            let result = self.call_api(model, &request).await?;
            let candidate = Self::first_candidate(&result)?;

            let parts = candidate
                .content
                .as_ref()
                .map_or(&[][..], |content| content.parts.as_slice());
            let content_blocks = Self::parse_content_blocks(parts);
            let text = content_blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    ContentBlock::ToolUse { .. } | ContentBlock::ToolResult { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n");
            let stop_reason = Self::map_stop_reason(candidate, &content_blocks);

            tracing::debug!(
                stop_reason = ?stop_reason,
                text = %scrub_secret_patterns(&text),
                "gemini tool turn"
            );

            Ok(ProviderResponse {
                text,
                content_blocks,
                stop_reason: Some(stop_reason),
            })
        })
    }
}
