#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde_json::{Value, json};

use guarded_relay::agent::{
    AgentCell, AgentFactory, AgentInput, ToolAgent, Transcript, TranscriptEntry,
};
use guarded_relay::context::{AgentBinding, AlwaysRelevant, ContextAggregator, StateStore};
use guarded_relay::error::ScanError;
use guarded_relay::guardrail::{ScanVerdict, Scanner};
use guarded_relay::llm::{Provider, ProviderMessage, ProviderResponse, ToolSpec};
use guarded_relay::pipeline::{
    EventSink, GenerationInvoker, Orchestrator, PipelineOutcome, PromptComposer, Request,
    StreamEvent,
};

pub const SYSTEM: &str = "You are the infrastructure assistant.";

pub fn allow() -> Value {
    json!({"action": "allow", "category": "benign"})
}

pub fn block_injection() -> Value {
    json!({
        "action": "block",
        "category": "malicious",
        "promptDetected": {"injection": true}
    })
}

// ── Scanner ──────────────────────────────────────────────────────────────────

/// Answers scans from a script; once it runs dry every scan is allowed.
#[derive(Default)]
pub struct ScriptedScanner {
    script: Mutex<VecDeque<Result<Value, ScanError>>>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedScanner {
    pub fn new(script: impl IntoIterator<Item = Result<Value, ScanError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn allowing() -> Self {
        Self::default()
    }

    /// Every text scanned so far, in call order.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl Scanner for ScriptedScanner {
    fn scan<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ScanVerdict, ScanError>> + Send + 'a>> {
        self.seen.lock().unwrap().push(text.to_string());
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(allow()));
        Box::pin(async move { next.map(ScanVerdict::from_value) })
    }
}

// ── Generation provider ──────────────────────────────────────────────────────

pub struct FakeProvider {
    reply: Result<String, String>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
    finished: AtomicUsize,
}

impl FakeProvider {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            delay: None,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        }
    }

    /// Sleeps for `delay` before answering.
    pub fn slow(reply: &str, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::replying(reply)
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            ..Self::replying("")
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls that ran to the end, i.e. were not aborted mid-flight.
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

impl Provider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn chat_with_system<'a>(
        &'a self,
        _system_prompt: Option<&'a str>,
        message: &'a str,
        _model: &'a str,
        _temperature: f64,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(message.to_string());
        let reply = self.reply.clone();
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.finished.fetch_add(1, Ordering::SeqCst);
            reply.map_err(|e| anyhow!(e))
        })
    }

    fn chat_with_tools<'a>(
        &'a self,
        _system_prompt: Option<&'a str>,
        _messages: &'a [ProviderMessage],
        _tools: &'a [ToolSpec],
        _model: &'a str,
        _temperature: f64,
    ) -> Pin<Box<dyn Future<Output = Result<ProviderResponse>> + Send + 'a>> {
        Box::pin(async { Err(anyhow!("tool calls are not scripted")) })
    }
}

// ── State store ──────────────────────────────────────────────────────────────

pub struct StaticStore(pub Result<Vec<String>, String>);

impl StateStore for StaticStore {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn fetch_rows(&self) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + '_>> {
        let rows = self.0.clone();
        Box::pin(async move { rows.map_err(|e| anyhow!(e)) })
    }
}

// ── Agent ────────────────────────────────────────────────────────────────────

pub struct ScriptedAgent(pub Result<String, String>);

impl ToolAgent for ScriptedAgent {
    fn invoke<'a>(
        &'a self,
        input: AgentInput,
    ) -> Pin<Box<dyn Future<Output = Result<Transcript>> + Send + 'a>> {
        let answer = self.0.clone();
        Box::pin(async move {
            let answer = answer.map_err(|e| anyhow!(e))?;
            let question = input
                .messages
                .first()
                .map(|message| message.content.clone())
                .unwrap_or_default();
            Ok(Transcript::new(vec![
                TranscriptEntry::User(question),
                TranscriptEntry::Assistant(answer),
            ]))
        })
    }
}

/// Fails the first `failures` connects, then hands out one shared agent.
pub struct FlakyFactory {
    failures: usize,
    attempts: AtomicUsize,
    agent: Arc<ScriptedAgent>,
}

impl FlakyFactory {
    pub fn new(failures: usize, answer: Result<&str, &str>) -> Self {
        Self {
            failures,
            attempts: AtomicUsize::new(0),
            agent: Arc::new(ScriptedAgent(
                answer.map(str::to_string).map_err(str::to_string),
            )),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl AgentFactory for FlakyFactory {
    fn connect(&self) -> Pin<Box<dyn Future<Output = Result<Arc<dyn ToolAgent>>> + Send + '_>> {
        Box::pin(async move {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(anyhow!("MCP server unreachable"));
            }
            let agent: Arc<dyn ToolAgent> = self.agent.clone();
            Ok(agent)
        })
    }
}

pub fn agent_binding(factory: Arc<FlakyFactory>, required: bool) -> AgentBinding {
    AgentBinding {
        cell: Arc::new(AgentCell::new(factory)),
        relevance: Arc::new(AlwaysRelevant),
        required,
    }
}

// ── Assembly ─────────────────────────────────────────────────────────────────

pub fn orchestrator(
    scanner: Arc<ScriptedScanner>,
    provider: Arc<FakeProvider>,
    store: Option<Arc<dyn StateStore>>,
    agent: Option<AgentBinding>,
) -> Orchestrator {
    Orchestrator::new(
        scanner,
        ContextAggregator::new(store, agent),
        PromptComposer::new(SYSTEM),
        GenerationInvoker::new(provider, "gemini-test", 0.2),
    )
}

/// Run one request and collect every event it emitted, in order.
pub async fn run_collecting(
    orchestrator: &Orchestrator,
    text: &str,
) -> (Vec<StreamEvent>, PipelineOutcome) {
    let request = Request::new(text).expect("non-empty request");
    let (sink, mut rx) = EventSink::channel();
    let collector = tokio::spawn(async move {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    });

    let outcome = orchestrator.run(&request, &sink).await;
    drop(sink);
    (collector.await.unwrap(), outcome)
}

/// `log*, (mcp+ log*)?, (gemini|error)`, terminal event last and only once.
pub fn follows_event_grammar(events: &[StreamEvent]) -> bool {
    let Some((last, body)) = events.split_last() else {
        return false;
    };
    if !last.is_terminal() {
        return false;
    }

    let mut seen_mcp = false;
    let mut mcp_closed = false;
    for event in body {
        match event.kind() {
            "log" => mcp_closed |= seen_mcp,
            "mcp" if !mcp_closed => seen_mcp = true,
            _ => return false,
        }
    }
    true
}

pub fn kinds(events: &[StreamEvent]) -> Vec<&'static str> {
    events.iter().map(StreamEvent::kind).collect()
}
