//! Article text generation seam.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub title: String,
    pub requested_by: String,
    pub max_output_tokens: u32,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
    #[error("generation transport failed: {0}")]
    Transport(String),
    #[error("generation service answered {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("generation response was malformed: {0}")]
    Malformed(String),
    #[error("no generation service is configured")]
    NotConfigured,
}

impl GenerationError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Timeout(_) | GenerationError::Transport(_) => true,
            GenerationError::Upstream { status, .. } => *status == 429 || *status >= 500,
            GenerationError::Malformed(_) | GenerationError::NotConfigured => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::Timeout(_) => "timeout",
            GenerationError::Transport(_) => "transport",
            GenerationError::Upstream { .. } => "upstream",
            GenerationError::Malformed(_) => "malformed",
            GenerationError::NotConfigured => "not_configured",
        }
    }
}

/// Produces the HTML body of an article. Implementations honour the
/// request's token budget and timeout.
#[async_trait]
pub trait ArticleGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Stand-in used when no generation service is configured. Stored articles
/// are still served; unknown titles fail with [`GenerationError::NotConfigured`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredGenerator;

#[async_trait]
impl ArticleGenerator for UnconfiguredGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
        Err(GenerationError::NotConfigured)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before attempt `n + 1` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Budget applied to every article generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationPolicy {
    pub max_output_tokens: u32,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl GenerationPolicy {
    pub fn request(&self, title: &str, requested_by: &str) -> GenerationRequest {
        GenerationRequest {
            title: title.to_string(),
            requested_by: requested_by.to_string(),
            max_output_tokens: self.max_output_tokens,
            timeout: self.timeout,
        }
    }
}

impl Default for GenerationPolicy {
    fn default() -> Self {
        Self {
            max_output_tokens: 1600,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Run `generator` up to `policy.max_attempts` times, retrying only
/// retryable failures. The last error is returned once attempts run out.
pub async fn generate_with_retry(
    generator: &dyn ArticleGenerator,
    request: &GenerationRequest,
    policy: RetryPolicy,
) -> Result<String, GenerationError> {
    let max_attempts = policy.max_attempts.max(1);
    let started = Instant::now();
    let mut attempt = 1;

    loop {
        match generator.generate(request).await {
            Ok(text) => {
                histogram!("infinitewiki_generation_ms")
                    .record(started.elapsed().as_secs_f64() * 1_000.0);
                info!(
                    target = "infinitewiki::generation",
                    title = %request.title,
                    attempt,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "article generated"
                );
                return Ok(text);
            }
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                warn!(
                    target = "infinitewiki::generation",
                    title = %request.title,
                    attempt,
                    max_attempts,
                    error = %err,
                    "generation attempt failed; retrying"
                );
                counter!("infinitewiki_generation_retry_total", "kind" => err.kind())
                    .increment(1);
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
            Err(err) => {
                warn!(
                    target = "infinitewiki::generation",
                    title = %request.title,
                    attempt,
                    error = %err,
                    "generation failed"
                );
                counter!("infinitewiki_generation_failed_total", "kind" => err.kind())
                    .increment(1);
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct Scripted {
        replies: Mutex<Vec<Result<String, GenerationError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(mut replies: Vec<Result<String, GenerationError>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().expect("calls lock")
        }
    }

    #[async_trait]
    impl ArticleGenerator for Scripted {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
            *self.calls.lock().expect("calls lock") += 1;
            self.replies
                .lock()
                .expect("replies lock")
                .pop()
                .unwrap_or(Err(GenerationError::Malformed("script exhausted".into())))
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            title: "Photosynthesis".to_string(),
            requested_by: "ada".to_string(),
            max_output_tokens: 256,
            timeout: Duration::from_secs(1),
        }
    }

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let generator = Scripted::new(vec![
            Err(GenerationError::Timeout(Duration::from_secs(1))),
            Err(GenerationError::Upstream {
                status: 503,
                message: "busy".into(),
            }),
            Ok("<p>text</p>".into()),
        ]);

        let text = generate_with_retry(&generator, &request(), quick(3))
            .await
            .expect("third attempt succeeds");

        assert_eq!(text, "<p>text</p>");
        assert_eq!(generator.calls(), 3);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let generator = Scripted::new(vec![
            Err(GenerationError::Transport("reset".into())),
            Err(GenerationError::Transport("reset".into())),
            Ok("never reached".into()),
        ]);

        let err = generate_with_retry(&generator, &request(), quick(2))
            .await
            .expect_err("gives up");

        assert_eq!(err, GenerationError::Transport("reset".into()));
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn terminal_failures_are_not_retried() {
        let generator = Scripted::new(vec![
            Err(GenerationError::Upstream {
                status: 401,
                message: "bad key".into(),
            }),
            Ok("never reached".into()),
        ]);

        let err = generate_with_retry(&generator, &request(), quick(3))
            .await
            .expect_err("terminal");

        assert!(matches!(err, GenerationError::Upstream { status: 401, .. }));
        assert_eq!(generator.calls(), 1);
    }

    #[test]
    fn retryable_classification() {
        assert!(GenerationError::Timeout(Duration::ZERO).is_retryable());
        assert!(
            GenerationError::Upstream {
                status: 429,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(!GenerationError::Malformed(String::new()).is_retryable());
        assert!(!GenerationError::NotConfigured.is_retryable());
    }
}
