//! The pipeline's only policy authority: verdict in, decision out.

use super::verdict::{ScanAction, ScanVerdict};

pub const ALLOWED_REASON: &str = "Allowed";
pub const INVALID_FORMAT_REASON: &str = "invalid scan response format";
const NO_SIGNAL_FALLBACK: &str = "malicious content";

/// Binary allow/block outcome plus a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyDecision {
    pub safe: bool,
    pub reason: String,
}

impl SafetyDecision {
    fn allow() -> Self {
        Self {
            safe: true,
            reason: ALLOWED_REASON.to_string(),
        }
    }

    fn block(reason: String) -> Self {
        Self {
            safe: false,
            reason,
        }
    }
}

/// Evaluate a verdict. Pure, total and deterministic.
///
/// Rules, first match wins:
/// 1. not a JSON object → unsafe, "invalid scan response format"
/// 2. `allow` + `benign` → safe
/// 3. `block` + `malicious` → unsafe, listing every detected signal
/// 4. anything else → unsafe, echoing the unexpected pair
pub fn evaluate(verdict: &ScanVerdict) -> SafetyDecision {
    if !verdict.is_well_formed() {
        return SafetyDecision::block(INVALID_FORMAT_REASON.to_string());
    }

    match (&verdict.action, verdict.category.as_deref()) {
        (ScanAction::Allow, Some("benign")) => SafetyDecision::allow(),
        (ScanAction::Block, Some("malicious")) => {
            let signals: Vec<String> = verdict.true_signals().map(humanize_signal).collect();
            let reason_text = if signals.is_empty() {
                NO_SIGNAL_FALLBACK.to_string()
            } else {
                signals.join(", ")
            };
            SafetyDecision::block(format!("Blocked by guardrail: {reason_text}"))
        }
        (action, category) => SafetyDecision::block(format!(
            "Blocked due to unknown decision: action={}, category={}",
            action.as_str().unwrap_or("<missing>"),
            category.unwrap_or("<missing>"),
        )),
    }
}

/// `prompt_injection` → `Prompt Injection`.
pub fn humanize_signal(key: &str) -> String {
    key.split(['_', '-', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}
