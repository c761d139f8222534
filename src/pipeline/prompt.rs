use super::request::Request;
use crate::context::{ContextFragment, ContextSource};
use std::fmt;

/// The final text sent to the generation model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt(String);

impl ComposedPrompt {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComposedPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fixed-order template merge. No I/O, never fails.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    system_instructions: String,
}

impl PromptComposer {
    pub fn new(system_instructions: impl Into<String>) -> Self {
        Self {
            system_instructions: system_instructions.into(),
        }
    }

    /// System instructions, the question, agent context, then the state
    /// snapshot. Failed fragments are left out.
    pub fn compose(&self, request: &Request, fragments: &[ContextFragment]) -> ComposedPrompt {
        let usable = |source: ContextSource| {
            fragments
                .iter()
                .find(|fragment| fragment.source == source && fragment.ok)
                .map(|fragment| fragment.text.as_str())
        };

        let mut prompt = String::new();
        let system = self.system_instructions.trim();
        if !system.is_empty() {
            prompt.push_str(system);
            prompt.push_str("\n\n");
        }

        prompt.push_str("User Question:\n");
        prompt.push_str(request.text());
        prompt.push_str("\n\n");

        if let Some(agent) = usable(ContextSource::Agent) {
            prompt.push_str("MCP Agent Context (authoritative):\n");
            prompt.push_str(agent);
            prompt.push_str("\n- prioritize this information.\n\n");
        }

        if let Some(state) = usable(ContextSource::StateStore) {
            prompt.push_str("Current State Snapshot:\n");
            prompt.push_str(state);
            prompt.push_str("\n\n");
        }

        ComposedPrompt(prompt)
    }
}
