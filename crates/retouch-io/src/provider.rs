//! AI image provider.
//!
//! [`ImageProvider`] is the seam the editor calls through; the
//! production implementation is [`HttpImageProvider`], which talks to a
//! task-based generation API:
//!
//! 1. Submit a generation task and receive a task ID.
//! 2. Poll the task's status until it succeeds, fails, or the attempt
//!    budget runs out.
//! 3. Download the first result image.
//!
//! Polling is modelled as a [`PollState`] machine advanced by the pure
//! [`PollState::advance`]; the HTTP driver only observes statuses and
//! sleeps between attempts.

use std::thread;

use base64::Engine as _;
use base64::engine::general_purpose;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ProviderConfig;

/// Errors from the AI provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// No API key is configured.
    #[error("no API key configured (set {})", crate::config::API_KEY_ENV)]
    NotConfigured,

    /// The request could not be sent or the response not read.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// The provider reported an error in its response envelope.
    #[error("provider rejected request (code {code}): {message}")]
    Rejected {
        /// Provider status code.
        code: i64,
        /// Provider message.
        message: String,
    },

    /// A response did not have the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The generation task ended in a failure status.
    #[error("generation failed with status {0}")]
    TaskFailed(String),

    /// The task did not finish within the polling budget.
    #[error("no result after {attempts} status checks")]
    TimedOut {
        /// Status checks made.
        attempts: u32,
    },
}

/// A generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Text prompt or edit command.
    pub prompt: String,
    /// Source image for edits, as JPEG bytes. `None` generates from the
    /// prompt alone.
    pub source_jpeg: Option<Vec<u8>>,
}

impl GenerationRequest {
    /// Text-to-image request.
    #[must_use]
    pub fn generate(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            source_jpeg: None,
        }
    }

    /// Image edit request.
    #[must_use]
    pub fn edit(command: impl Into<String>, source_jpeg: Vec<u8>) -> Self {
        Self {
            prompt: command.into(),
            source_jpeg: Some(source_jpeg),
        }
    }
}

/// Trait for AI image providers.
///
/// Calls may block for minutes. Callers must not hold locks across
/// them.
pub trait ImageProvider: Send + Sync {
    /// Run a generation request and return the encoded result image.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] describing why no image was produced.
    fn generate(&self, request: &GenerationRequest) -> Result<Vec<u8>, ProviderError>;
}

/// State of a submitted generation task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    /// Task accepted, not yet polled.
    Submitted,
    /// `attempt` status checks made, task still running.
    Polling {
        /// Status checks made so far.
        attempt: u32,
    },
    /// The task produced an image at `url`.
    Succeeded {
        /// Result image location.
        url: String,
    },
    /// The task reported a failure status.
    Failed {
        /// Provider status string.
        status: String,
    },
    /// The attempt budget ran out.
    TimedOut {
        /// Status checks made.
        attempts: u32,
    },
}

/// What one status check saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollObservation {
    /// The task is still running.
    Pending,
    /// The task finished with a result image.
    Succeeded(String),
    /// The task finished with a failure status.
    Failed(String),
    /// The status check itself failed (e.g. a non-success HTTP status).
    Unavailable,
}

impl PollState {
    /// Next state after one status check, given a budget of
    /// `max_attempts` checks.
    ///
    /// Terminal states absorb every observation.
    #[must_use]
    pub fn advance(self, observation: PollObservation, max_attempts: u32) -> Self {
        let made = match self {
            Self::Submitted => 0,
            Self::Polling { attempt } => attempt,
            terminal @ (Self::Succeeded { .. } | Self::Failed { .. } | Self::TimedOut { .. }) => {
                return terminal;
            }
        };
        let attempt = made.saturating_add(1);
        match observation {
            PollObservation::Succeeded(url) => Self::Succeeded { url },
            PollObservation::Failed(status) => Self::Failed { status },
            PollObservation::Pending | PollObservation::Unavailable if attempt >= max_attempts => {
                Self::TimedOut { attempts: attempt }
            }
            PollObservation::Pending | PollObservation::Unavailable => Self::Polling { attempt },
        }
    }

    /// Whether no further status checks will change the state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded { .. } | Self::Failed { .. } | Self::TimedOut { .. }
        )
    }
}

/// Provider status meaning the task is still running.
pub const STATUS_GENERATING: &str = "GENERATING";
/// Provider status meaning the task succeeded.
pub const STATUS_SUCCESS: &str = "SUCCESS";
/// Provider statuses meaning the task failed.
pub const FAILURE_STATUSES: [&str; 2] = ["CREATE_TASK_FAILED", "GENERATE_FAILED"];

/// Response envelope shared by every provider endpoint.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: Option<i64>,
    msg: Option<String>,
    data: Option<T>,
}

impl<T> Envelope<T> {
    /// The payload, or the provider's error.
    fn into_data(self, what: &str) -> Result<T, ProviderError> {
        if let Some(code) = self.code.filter(|&c| c != 200) {
            return Err(ProviderError::Rejected {
                code,
                message: self.msg.unwrap_or_default(),
            });
        }
        self.data
            .ok_or_else(|| ProviderError::Malformed(format!("{what} response has no data")))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBody<'a> {
    prompt: &'a str,
    negative_prompt: &'a str,
    size: &'a str,
    n_variants: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    files_url: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitData {
    task_id: String,
}

#[derive(Debug, Deserialize)]
struct RecordData {
    status: String,
    #[serde(default)]
    response: Option<RecordResponse>,
    #[serde(default)]
    images: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordResponse {
    #[serde(default)]
    result_urls: Vec<String>,
}

/// Interpret a status-check response body.
///
/// # Errors
///
/// Returns [`ProviderError::Malformed`] if the body is not the expected
/// JSON or reports success without a result URL, and
/// [`ProviderError::Rejected`] for provider-level errors.
pub fn parse_record(body: &str) -> Result<PollObservation, ProviderError> {
    let envelope: Envelope<RecordData> = serde_json::from_str(body)
        .map_err(|e| ProviderError::Malformed(format!("status response: {e}")))?;
    let data = envelope.into_data("status")?;
    match data.status.as_str() {
        STATUS_SUCCESS => data
            .response
            .and_then(|r| r.result_urls.into_iter().next())
            .or_else(|| data.images.into_iter().next())
            .map(PollObservation::Succeeded)
            .ok_or_else(|| ProviderError::Malformed("task succeeded without a result URL".to_owned())),
        status if FAILURE_STATUSES.contains(&status) => Ok(PollObservation::Failed(data.status)),
        STATUS_GENERATING => Ok(PollObservation::Pending),
        other => {
            debug!(status = other, "unrecognized task status, still waiting");
            Ok(PollObservation::Pending)
        }
    }
}

/// Interpret a submit response body and return the task ID.
///
/// # Errors
///
/// Same as [`parse_record`].
pub fn parse_submit(body: &str) -> Result<String, ProviderError> {
    let envelope: Envelope<SubmitData> = serde_json::from_str(body)
        .map_err(|e| ProviderError::Malformed(format!("submit response: {e}")))?;
    Ok(envelope.into_data("submit")?.task_id)
}

/// `data:` URI carrying `bytes` inline.
#[must_use]
pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", general_purpose::STANDARD.encode(bytes))
}

/// Task-based HTTP provider.
#[derive(Debug)]
pub struct HttpImageProvider {
    client: Client,
    config: ProviderConfig,
    api_key: String,
}

impl HttpImageProvider {
    /// Submit endpoint, relative to the base URL.
    pub const SUBMIT_PATH: &str = "/api/v1/gpt4o-image/generate";
    /// Status endpoint, relative to the base URL.
    pub const RECORD_PATH: &str = "/api/v1/gpt4o-image/record-info";

    /// Build a client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotConfigured`] if there is no API key,
    /// or [`ProviderError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(ProviderError::NotConfigured)?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.config.base_url.trim_end_matches('/'))
    }

    fn submit(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let body = SubmitBody {
            prompt: &request.prompt,
            negative_prompt: &self.config.negative_prompt,
            size: &self.config.size,
            n_variants: 1,
            files_url: request
                .source_jpeg
                .as_deref()
                .map(|jpeg| vec![data_uri("image/jpeg", jpeg)]),
        };
        let resp = self
            .client
            .post(self.url(Self::SUBMIT_PATH))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;
        let status = resp.status();
        let text = resp.text()?;
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        parse_submit(&text)
    }

    fn check(&self, task_id: &str) -> Result<PollObservation, ProviderError> {
        let resp = self
            .client
            .get(self.url(Self::RECORD_PATH))
            .query(&[("taskId", task_id)])
            .bearer_auth(&self.api_key)
            .send()?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            warn!(task_id, status = status.as_u16(), body = %body, "status check failed");
            return Ok(PollObservation::Unavailable);
        }
        parse_record(&resp.text()?)
    }

    /// Poll until the task reaches a terminal state.
    fn wait(&self, task_id: &str) -> Result<String, ProviderError> {
        let max = self.config.poll_attempts.max(1);
        let mut state = PollState::Submitted;
        loop {
            state = match state {
                PollState::Succeeded { url } => return Ok(url),
                PollState::Failed { status } => return Err(ProviderError::TaskFailed(status)),
                PollState::TimedOut { attempts } => return Err(ProviderError::TimedOut { attempts }),
                PollState::Submitted => state.advance(self.check(task_id)?, max),
                PollState::Polling { attempt } => {
                    debug!(task_id, attempt, max, "task still running");
                    thread::sleep(self.config.poll_delay());
                    state.advance(self.check(task_id)?, max)
                }
            };
        }
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let resp = self.client.get(url).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: resp.text().unwrap_or_default(),
            });
        }
        Ok(resp.bytes()?.to_vec())
    }
}

impl ImageProvider for HttpImageProvider {
    fn generate(&self, request: &GenerationRequest) -> Result<Vec<u8>, ProviderError> {
        let task_id = self.submit(request)?;
        info!(task_id = %task_id, edit = request.source_jpeg.is_some(), "submitted generation task");
        let url = self.wait(&task_id)?;
        info!(task_id = %task_id, url = %url, "generation finished, downloading");
        self.download(&url)
    }
}
