use crate::config::{AgentConfig, AgentTrigger};
use std::sync::Arc;

/// Decides whether a request warrants a tool-agent call.
pub trait RelevancePredicate: Send + Sync {
    fn is_relevant(&self, text: &str) -> bool;
}

pub struct AlwaysRelevant;

impl RelevancePredicate for AlwaysRelevant {
    fn is_relevant(&self, _text: &str) -> bool {
        true
    }
}

/// Case-insensitive substring match against a keyword list.
pub struct KeywordRelevance {
    keywords: Vec<String>,
}

impl KeywordRelevance {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|keyword| keyword.as_ref().trim().to_lowercase())
                .filter(|keyword| !keyword.is_empty())
                .collect(),
        }
    }
}

impl RelevancePredicate for KeywordRelevance {
    fn is_relevant(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.keywords
            .iter()
            .any(|keyword| lowered.contains(keyword.as_str()))
    }
}

pub fn from_config(config: &AgentConfig) -> Arc<dyn RelevancePredicate> {
    match config.trigger {
        AgentTrigger::Always => Arc::new(AlwaysRelevant),
        AgentTrigger::Keywords => Arc::new(KeywordRelevance::new(&config.keywords)),
    }
}
