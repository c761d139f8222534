//! Parsed form of one safety-scan response.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Decision the classifier reported for a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanAction {
    Allow,
    Block,
    /// Anything else, including a missing field. Keeps the raw value so the
    /// evaluator can report it verbatim.
    Unknown(Option<String>),
}

impl ScanAction {
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("allow") => Self::Allow,
            Some("block") => Self::Block,
            other => Self::Unknown(other.map(ToOwned::to_owned)),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Allow => Some("allow"),
            Self::Block => Some("block"),
            Self::Unknown(raw) => raw.as_deref(),
        }
    }
}

/// Structured output of the safety-scanning service for one piece of text.
///
/// Parsing never fails: missing or garbled fields degrade to
/// [`ScanAction::Unknown`] / `None` and the evaluator decides what that means.
/// The raw response is kept and is what callers see as the `verdict` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanVerdict {
    pub action: ScanAction,
    pub category: Option<String>,
    /// Signal name → detected, in response order.
    pub detected_signals: Vec<(String, bool)>,
    raw: Value,
}

impl ScanVerdict {
    pub fn from_value(raw: Value) -> Self {
        let Some(object) = raw.as_object() else {
            return Self {
                action: ScanAction::Unknown(None),
                category: None,
                detected_signals: Vec::new(),
                raw,
            };
        };

        let action = ScanAction::parse(object.get("action").and_then(Value::as_str));
        let category = object
            .get("category")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned);
        let detected_signals = detected_map(object, "prompt_detected", "promptDetected")
            .or_else(|| detected_map(object, "response_detected", "responseDetected"))
            .map(|map| {
                map.iter()
                    .map(|(name, value)| (name.clone(), value.as_bool().unwrap_or(false)))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            action,
            category,
            detected_signals,
            raw,
        }
    }

    /// Verdict standing in for a 2xx body that was not JSON at all.
    pub fn unparseable(body: &str) -> Self {
        Self::from_value(Value::String(body.to_owned()))
    }

    /// `false` when the response was not a JSON object and cannot be
    /// interpreted at all.
    pub fn is_well_formed(&self) -> bool {
        self.raw.is_object()
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn true_signals(&self) -> impl Iterator<Item = &str> {
        self.detected_signals
            .iter()
            .filter(|(_, detected)| *detected)
            .map(|(name, _)| name.as_str())
    }
}

/// First non-empty detection map under either spelling of `key`.
fn detected_map<'a>(
    object: &'a Map<String, Value>,
    key: &str,
    alias: &str,
) -> Option<&'a Map<String, Value>> {
    object
        .get(key)
        .or_else(|| object.get(alias))
        .and_then(Value::as_object)
        .filter(|map| !map.is_empty())
}

impl Serialize for ScanVerdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}
