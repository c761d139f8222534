use std::fmt;

/// Where a piece of prompt context came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextSource {
    StateStore,
    Agent,
}

impl fmt::Display for ContextSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::StateStore => "state store",
            Self::Agent => "agent",
        })
    }
}

/// Context pulled for one request. `ok = false` fragments carry the failure
/// message and are never placed in a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFragment {
    pub source: ContextSource,
    pub text: String,
    pub ok: bool,
}

impl ContextFragment {
    pub fn ok(source: ContextSource, text: impl Into<String>) -> Self {
        Self {
            source,
            text: text.into(),
            ok: true,
        }
    }

    pub fn failed(source: ContextSource, message: impl Into<String>) -> Self {
        Self {
            source,
            text: message.into(),
            ok: false,
        }
    }
}
