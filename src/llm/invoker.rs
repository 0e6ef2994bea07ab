use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use super::transport::{ChatTransport, TransportError};

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("model call failed and retrying would not help: {0}")]
    Terminal(#[source] TransportError),
    #[error("all {attempts} candidate models failed, last error: {last}")]
    Exhausted {
        attempts: usize,
        #[source]
        last: TransportError,
    },
    #[error("no candidate models configured")]
    NoCandidates,
}

/// Shared fallback policy: the fixed ordered candidate list plus the
/// retriable/terminal split (`TransportError::is_retriable`). Every model
/// call site consumes this uniformly instead of rebuilding its own list.
#[derive(Debug, Clone)]
pub struct FallbackPolicy {
    fallback_models: Vec<String>,
}

impl FallbackPolicy {
    pub fn new(fallback_models: Vec<String>) -> Self {
        Self { fallback_models }
    }

    /// Candidate order for one invocation: the preferred model first, then
    /// the fixed fallbacks, deduplicated while preserving order.
    pub fn candidates(&self, preferred: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for model in std::iter::once(preferred).chain(self.fallback_models.iter().map(String::as_str)) {
            let model = model.trim();
            if model.is_empty() || out.iter().any(|m| m == model) {
                continue;
            }
            out.push(model.to_string());
        }
        out
    }
}

/// Best-effort multi-model completion call. Walks the candidate list in
/// order, short-circuits on the first usable completion, skips ahead on
/// retriable failures and stops immediately on terminal ones.
pub struct ModelInvoker {
    transport: Arc<dyn ChatTransport>,
    policy: FallbackPolicy,
}

impl ModelInvoker {
    pub fn new(transport: Arc<dyn ChatTransport>, policy: FallbackPolicy) -> Self {
        Self { transport, policy }
    }

    pub async fn invoke(
        &self,
        preferred: &str,
        system: Option<&str>,
        prompt: &str,
    ) -> Result<String, InvokeError> {
        let candidates = self.policy.candidates(preferred);
        let mut attempts = 0;
        let mut last_error = None;

        for model in &candidates {
            attempts += 1;
            match self.transport.complete(model, system, prompt).await {
                Ok(text) => {
                    debug!("model {} answered on attempt {}", model, attempts);
                    return Ok(text);
                }
                Err(err) if err.is_retriable() => {
                    warn!("model {} failed ({}), trying next candidate", model, err);
                    last_error = Some(err);
                }
                Err(err) => {
                    warn!("model {} failed terminally: {}", model, err);
                    return Err(InvokeError::Terminal(err));
                }
            }
        }

        match last_error {
            Some(last) => Err(InvokeError::Exhausted { attempts, last }),
            None => Err(InvokeError::NoCandidates),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    struct ScriptedTransport {
        outcomes: Mutex<VecDeque<Result<String, TransportError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(outcomes: Vec<Result<String, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn complete(
            &self,
            _model: &str,
            _system: Option<&str>,
            _prompt: &str,
        ) -> Result<String, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .expect("transport called more times than scripted")
        }
    }

    fn retriable() -> TransportError {
        TransportError::Http {
            model: "m".to_string(),
            status: StatusCode::TOO_MANY_REQUESTS,
            body: "rate limited".to_string(),
        }
    }

    fn terminal() -> TransportError {
        TransportError::Http {
            model: "m".to_string(),
            status: StatusCode::UNAUTHORIZED,
            body: "bad key".to_string(),
        }
    }

    fn policy() -> FallbackPolicy {
        FallbackPolicy::new(vec!["fallback-a".to_string(), "fallback-b".to_string()])
    }

    #[test]
    fn candidates_put_preferred_first_and_dedup() {
        let policy = FallbackPolicy::new(vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
        ]);
        assert_eq!(policy.candidates("b"), vec!["b", "a", "c"]);
    }

    #[test]
    fn candidates_skip_empty_entries() {
        let policy = FallbackPolicy::new(vec!["".to_string(), "a".to_string()]);
        assert_eq!(policy.candidates("a"), vec!["a"]);
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let transport = ScriptedTransport::new(vec![Ok("hello".to_string())]);
        let invoker = ModelInvoker::new(transport.clone(), policy());

        let text = invoker.invoke("preferred", None, "hi").await.unwrap();
        assert_eq!(text, "hello");
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn retriable_failures_continue_to_next_candidate() {
        let transport = ScriptedTransport::new(vec![
            Err(retriable()),
            Err(retriable()),
            Ok("third time lucky".to_string()),
        ]);
        let invoker = ModelInvoker::new(transport.clone(), policy());

        let text = invoker.invoke("preferred", None, "hi").await.unwrap();
        assert_eq!(text, "third time lucky");
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn terminal_failure_stops_after_one_call() {
        let transport = ScriptedTransport::new(vec![Err(terminal())]);
        let invoker = ModelInvoker::new(transport.clone(), policy());

        let err = invoker.invoke("preferred", None, "hi").await.unwrap_err();
        assert!(matches!(err, InvokeError::Terminal(_)));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn exhaustion_reports_attempts_and_last_cause() {
        let transport = ScriptedTransport::new(vec![
            Err(retriable()),
            Err(retriable()),
            Err(retriable()),
        ]);
        let invoker = ModelInvoker::new(transport.clone(), policy());

        let err = invoker.invoke("preferred", None, "hi").await.unwrap_err();
        match err {
            InvokeError::Exhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected Exhausted, got {:?}", other),
        }
        assert_eq!(transport.calls(), 3);
    }
}
