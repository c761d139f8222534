use super::verdict::ScanVerdict;
use crate::config::GuardrailConfig;
use crate::error::ScanError;
use crate::llm::{build_provider_client_with_timeout, sanitize_api_error};
use reqwest::Client;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

/// A content-safety classifier.
pub trait Scanner: Send + Sync {
    /// Classify one piece of text.
    ///
    /// `Err` means no verdict was obtained (transport failure or non-2xx);
    /// it is never used to signal a block.
    fn scan<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ScanVerdict, ScanError>> + Send + 'a>>;
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ScanRequest<'a> {
    metadata: ScanMetadata<'a>,
    contents: Vec<ScanContent<'a>>,
    ai_profile: AiProfile<'a>,
}

#[derive(Debug, Serialize)]
struct ScanMetadata<'a> {
    ai_model: &'a str,
    app_name: &'a str,
    app_user: &'a str,
}

#[derive(Debug, Serialize)]
struct ScanContent<'a> {
    prompt: &'a str,
}

#[derive(Debug, Serialize)]
struct AiProfile<'a> {
    profile_name: &'a str,
}

// ── AIRS scanner ─────────────────────────────────────────────────────────────

/// Synchronous-scan client for the AI runtime security API.
pub struct AirsScanner {
    endpoint: String,
    api_key: String,
    profile_name: String,
    ai_model: String,
    app_name: String,
    app_user: String,
    client: Client,
}

impl AirsScanner {
    pub fn new(config: &GuardrailConfig) -> anyhow::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("guardrail api_key is not set"))?;
        let profile_name = config
            .profile_name
            .clone()
            .filter(|profile| !profile.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("guardrail profile_name is not set"))?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key,
            profile_name,
            ai_model: config.ai_model.clone(),
            app_name: config.app_name.clone(),
            app_user: config.app_user.clone(),
            client: build_provider_client_with_timeout(config.timeout_secs),
        })
    }

    fn build_request<'a>(&'a self, text: &'a str) -> ScanRequest<'a> {
        ScanRequest {
            metadata: ScanMetadata {
                ai_model: &self.ai_model,
                app_name: &self.app_name,
                app_user: &self.app_user,
            },
            contents: vec![ScanContent { prompt: text }],
            ai_profile: AiProfile {
                profile_name: &self.profile_name,
            },
        }
    }

    async fn scan_impl(&self, text: &str) -> Result<ScanVerdict, ScanError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-pan-token", &self.api_key)
            .json(&self.build_request(text))
            .send()
            .await
            .map_err(|e| ScanError::Transport(sanitize_api_error(&e.to_string())))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ScanError::Transport(sanitize_api_error(&e.to_string())))?;

        if !status.is_success() {
            return Err(ScanError::Status {
                status: status.as_u16(),
                body: sanitize_api_error(&body),
            });
        }

        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(value) => Ok(ScanVerdict::from_value(value)),
            Err(e) => {
                tracing::warn!("guardrail returned a non-JSON body: {e}");
                Ok(ScanVerdict::unparseable(&body))
            }
        }
    }
}

impl Scanner for AirsScanner {
    fn scan<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ScanVerdict, ScanError>> + Send + 'a>> {
        Box::pin(self.scan_impl(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrail::{ScanAction, evaluate};
    use serde_json::json;
    use std::time::{Duration, Instant};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn scanner_for(server: &MockServer) -> AirsScanner {
        let config = GuardrailConfig {
            endpoint: format!("{}/v1/scan/sync/request", server.uri()),
            api_key: Some("pan-test-key".into()),
            profile_name: Some("strict-profile".into()),
            ..GuardrailConfig::default()
        };
        AirsScanner::new(&config).unwrap()
    }

    #[test]
    fn new_requires_key_and_profile() {
        let missing_key = GuardrailConfig {
            profile_name: Some("p".into()),
            ..GuardrailConfig::default()
        };
        assert!(AirsScanner::new(&missing_key).is_err());

        let missing_profile = GuardrailConfig {
            api_key: Some("k".into()),
            profile_name: Some("  ".into()),
            ..GuardrailConfig::default()
        };
        assert!(AirsScanner::new(&missing_profile).is_err());
    }

    #[tokio::test]
    async fn sends_expected_request_and_parses_verdict() {
        let server = MockServer::start().await;
        let defaults = GuardrailConfig::default();
        let expected_body = json!({
            "metadata": {
                "ai_model": defaults.ai_model,
                "app_name": defaults.app_name,
                "app_user": defaults.app_user,
            },
            "contents": [{"prompt": "hello"}],
            "ai_profile": {"profile_name": "strict-profile"}
        });

        Mock::given(method("POST"))
            .and(path("/v1/scan/sync/request"))
            .and(header("x-pan-token", "pan-test-key"))
            .and(body_json(expected_body))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"action": "allow", "category": "benign"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let verdict = scanner_for(&server).scan("hello").await.unwrap();
        assert_eq!(verdict.action, ScanAction::Allow);
        assert!(evaluate(&verdict).safe);
        server.verify().await;
    }

    #[tokio::test]
    async fn non_success_status_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let err = scanner_for(&server).scan("hello").await.unwrap_err();
        assert!(matches!(err, ScanError::Status { status: 503, .. }));
        assert!(err.to_string().starts_with("scan failed:"));
    }

    #[tokio::test]
    async fn non_json_success_body_is_unsafe_verdict_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let verdict = scanner_for(&server).scan("hello").await.unwrap();
        assert!(!verdict.is_well_formed());
        let decision = evaluate(&verdict);
        assert!(!decision.safe);
        assert_eq!(decision.reason, "invalid scan response format");
    }

    #[tokio::test]
    async fn slow_service_times_out_as_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"action": "allow", "category": "benign"}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let config = GuardrailConfig {
            endpoint: format!("{}/v1/scan/sync/request", server.uri()),
            api_key: Some("k".into()),
            profile_name: Some("p".into()),
            timeout_secs: 1,
            ..GuardrailConfig::default()
        };
        let started = Instant::now();
        let err = AirsScanner::new(&config)
            .unwrap()
            .scan("hello")
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::Transport(_)));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn unreachable_service_is_transport_error() {
        let config = GuardrailConfig {
            endpoint: "http://127.0.0.1:9/v1/scan/sync/request".into(),
            api_key: Some("k".into()),
            profile_name: Some("p".into()),
            timeout_secs: 2,
            ..GuardrailConfig::default()
        };
        let err = AirsScanner::new(&config)
            .unwrap()
            .scan("hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Transport(_)));
    }
}
