use crate::guardrail::ScanVerdict;
use thiserror::Error;

// ─── Pipeline errors ─────────────────────────────────────────────────────────

/// Terminal failure of one pipeline run.
///
/// Every variant is produced and handled inside the stage that raised it and
/// surfaces to the caller as exactly one `error` event (streaming) or one
/// `{ "error": ... }` body (synchronous). Only [`PipelineError::PolicyBlock`]
/// is an expected outcome rather than a failure, and only it carries a verdict.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    // ── Guardrail ───────────────────────────────────────────────────────
    #[error("{0}")]
    ScanTransport(#[from] ScanError),

    #[error("{reason}")]
    PolicyBlock {
        reason: String,
        verdict: Box<ScanVerdict>,
    },

    // ── Context ─────────────────────────────────────────────────────────
    #[error("{source_name} query failed: {message}")]
    ContextFetch {
        source_name: &'static str,
        message: String,
    },

    #[error("Failed to initialize agent: {0}")]
    AgentInit(String),

    #[error("MCP agent error: {0}")]
    AgentInvocation(String),

    // ── Generation ──────────────────────────────────────────────────────
    #[error("Generation error: {0}")]
    Generation(String),
}

impl PipelineError {
    pub fn policy_block(reason: impl Into<String>, verdict: ScanVerdict) -> Self {
        Self::PolicyBlock {
            reason: reason.into(),
            verdict: Box::new(verdict),
        }
    }

    /// The triggering verdict; present only on policy blocks.
    pub fn verdict(&self) -> Option<&ScanVerdict> {
        match self {
            Self::PolicyBlock { verdict, .. } => Some(verdict),
            Self::ScanTransport(_)
            | Self::ContextFetch { .. }
            | Self::AgentInit(_)
            | Self::AgentInvocation(_)
            | Self::Generation(_) => None,
        }
    }

    pub fn is_policy_block(&self) -> bool {
        matches!(self, Self::PolicyBlock { .. })
    }

    /// Short machine-readable label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ScanTransport(_) => "scan_transport",
            Self::PolicyBlock { .. } => "policy_block",
            Self::ContextFetch { .. } => "context_fetch",
            Self::AgentInit(_) => "agent_init",
            Self::AgentInvocation(_) => "agent_invocation",
            Self::Generation(_) => "generation",
        }
    }
}

// ─── Guardrail transport errors ─────────────────────────────────────────────

/// The safety-scan call did not produce a verdict at all.
///
/// Distinct from a block: a block is a verdict, this is the absence of one.
#[derive(Debug, Clone, Error)]
pub enum ScanError {
    #[error("scan failed: {0}")]
    Transport(String),

    #[error("scan failed: HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

// ─── Request validation ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Empty message")]
    Empty,
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("validation failed: {0}")]
    Validation(String),
}
