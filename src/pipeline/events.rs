//! Caller-facing progress events and the bounded channel that carries them.

use crate::guardrail::ScanVerdict;
use serde::Serialize;
use std::future::Future;
use tokio::sync::mpsc;

/// One element of the caller-visible event sequence. Emitted once, never revised.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Progress narration.
    Log { text: String },
    /// One line of tool-agent output.
    Mcp { text: String },
    /// The released generated answer.
    Gemini { text: String },
    /// Terminal failure; `verdict` only on policy blocks.
    Error {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        verdict: Option<ScanVerdict>,
    },
}

impl StreamEvent {
    pub fn log(text: impl Into<String>) -> Self {
        Self::Log { text: text.into() }
    }

    pub fn mcp(text: impl Into<String>) -> Self {
        Self::Mcp { text: text.into() }
    }

    /// `type` tag as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Log { .. } => "log",
            Self::Mcp { .. } => "mcp",
            Self::Gemini { .. } => "gemini",
            Self::Error { .. } => "error",
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Log { text } | Self::Mcp { text } | Self::Gemini { text } => text,
            Self::Error { text, .. } => text,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Gemini { .. } | Self::Error { .. })
    }
}

/// The receiving side went away; the run must stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnected;

/// Producer half of a request's event stream.
///
/// Backed by an mpsc channel of capacity 1, so a slow consumer stalls the
/// pipeline instead of letting events pile up.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<mpsc::Sender<StreamEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx: Some(tx) }, rx)
    }

    /// Sink that discards every event and never disconnects.
    pub fn null() -> Self {
        Self { tx: None }
    }

    pub async fn emit(&self, event: StreamEvent) -> Result<(), Disconnected> {
        tracing::trace!(kind = event.kind(), "emit");
        match &self.tx {
            Some(tx) => tx.send(event).await.map_err(|_| Disconnected),
            None => Ok(()),
        }
    }

    pub async fn log(&self, text: impl Into<String>) -> Result<(), Disconnected> {
        self.emit(StreamEvent::log(text)).await
    }

    /// Drive `fut` unless the receiver is dropped first.
    pub async fn until_closed<F: Future>(&self, fut: F) -> Result<F::Output, Disconnected> {
        let Some(tx) = &self.tx else {
            return Ok(fut.await);
        };

        tokio::select! {
            biased;
            () = tx.closed() => Err(Disconnected),
            output = fut => Ok(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn serializes_with_type_tag() {
        assert_eq!(
            serde_json::to_value(StreamEvent::log("Scanning input...")).unwrap(),
            json!({"type": "log", "text": "Scanning input..."})
        );
        assert_eq!(
            serde_json::to_value(StreamEvent::Error {
                text: "scan failed: timeout".into(),
                verdict: None,
            })
            .unwrap(),
            json!({"type": "error", "text": "scan failed: timeout"})
        );
    }

    #[test]
    fn error_carries_raw_verdict() {
        let raw = json!({"action": "block", "category": "malicious"});
        let event = StreamEvent::Error {
            text: "Blocked".into(),
            verdict: Some(ScanVerdict::from_value(raw.clone())),
        };
        assert_eq!(serde_json::to_value(&event).unwrap()["verdict"], raw);
        assert!(event.is_terminal());
    }

    #[tokio::test]
    async fn emit_fails_after_receiver_dropped() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        assert_eq!(sink.log("x").await, Err(Disconnected));
    }

    #[tokio::test]
    async fn null_sink_accepts_everything() {
        let sink = EventSink::null();
        assert!(sink.log("x").await.is_ok());
        assert_eq!(sink.until_closed(async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn until_closed_abandons_work_on_disconnect() {
        let (sink, rx) = EventSink::channel();
        let dropper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(rx);
        });

        let result = sink
            .until_closed(tokio::time::sleep(Duration::from_secs(30)))
            .await;
        assert_eq!(result, Err(Disconnected));
        dropper.await.unwrap();
    }

    #[tokio::test]
    async fn capacity_one_applies_backpressure() {
        let (sink, mut rx) = EventSink::channel();
        sink.log("first").await.unwrap();

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), sink.log("second")).await;
        assert!(blocked.is_err(), "second send should wait for the consumer");

        assert_eq!(rx.recv().await.unwrap().text(), "first");
    }
}
