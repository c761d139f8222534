use crate::error::RequestError;

/// A user request that passed the emptiness check. Immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    text: String,
}

impl Request {
    pub fn new(text: impl Into<String>) -> Result<Self, RequestError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(RequestError::Empty);
        }
        Ok(Self { text })
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}
