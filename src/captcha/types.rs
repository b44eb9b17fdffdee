//! Challenge types and solving-service API models

use serde::{Deserialize, Serialize};

/// Supported visual challenge kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    RecaptchaV2,
    HCaptcha,
}

impl ChallengeKind {
    /// Solving-service task type name
    pub fn task_type(&self) -> &'static str {
        match self {
            Self::RecaptchaV2 => "ReCaptchaV2TaskProxyLess",
            Self::HCaptcha => "HCaptchaTaskProxyLess",
        }
    }
}

/// Challenge solve request
#[derive(Debug, Clone)]
pub struct ChallengeRequest {
    pub kind: ChallengeKind,
    pub sitekey: String,
    pub page_url: String,
}

impl ChallengeRequest {
    pub fn recaptcha_v2(sitekey: &str, page_url: &str) -> Self {
        Self {
            kind: ChallengeKind::RecaptchaV2,
            sitekey: sitekey.to_string(),
            page_url: page_url.to_string(),
        }
    }

    pub fn hcaptcha(sitekey: &str, page_url: &str) -> Self {
        Self {
            kind: ChallengeKind::HCaptcha,
            sitekey: sitekey.to_string(),
            page_url: page_url.to_string(),
        }
    }
}

/// Outcome of one detect/resolve pass.
///
/// Always soft: the navigation state machine proceeds whichever variant comes
/// back, and callers that care can log it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeOutcome {
    /// No challenge markers observed on the page.
    NotDetected,
    /// A challenge was detected and a solution token was injected.
    Solved,
    /// A challenge was detected but no token could be obtained or injected.
    Unsolved,
}

impl ChallengeOutcome {
    pub fn solved(&self) -> bool {
        matches!(self, Self::Solved)
    }
}

/// Solved token plus timing
#[derive(Debug, Clone)]
pub struct CaptchaToken {
    pub token: String,
    pub solve_time_ms: u64,
}

// ========== Solving-service API models ==========

/// Create task request
#[derive(Debug, Serialize)]
pub struct CreateTaskRequest {
    #[serde(rename = "clientKey")]
    pub client_key: String,
    pub task: TaskDescriptor,
}

/// Task descriptors by challenge kind
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum TaskDescriptor {
    #[serde(rename = "ReCaptchaV2TaskProxyLess")]
    RecaptchaV2 {
        #[serde(rename = "websiteURL")]
        website_url: String,
        #[serde(rename = "websiteKey")]
        website_key: String,
    },

    #[serde(rename = "HCaptchaTaskProxyLess")]
    HCaptcha {
        #[serde(rename = "websiteURL")]
        website_url: String,
        #[serde(rename = "websiteKey")]
        website_key: String,
    },
}

impl TaskDescriptor {
    pub fn from_request(request: &ChallengeRequest) -> Self {
        match request.kind {
            ChallengeKind::RecaptchaV2 => Self::RecaptchaV2 {
                website_url: request.page_url.clone(),
                website_key: request.sitekey.clone(),
            },
            ChallengeKind::HCaptcha => Self::HCaptcha {
                website_url: request.page_url.clone(),
                website_key: request.sitekey.clone(),
            },
        }
    }
}

/// Create task response
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct CreateTaskResponse {
    #[serde(rename = "errorId")]
    pub error_id: i32,
    #[serde(rename = "errorCode")]
    pub error_code: Option<String>,
    #[serde(rename = "errorDescription")]
    pub error_description: Option<String>,
    #[serde(rename = "taskId")]
    pub task_id: Option<String>,
}

/// Get task result request
#[derive(Debug, Serialize)]
pub struct GetTaskResultRequest {
    #[serde(rename = "clientKey")]
    pub client_key: String,
    #[serde(rename = "taskId")]
    pub task_id: String,
}

/// Get task result response
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct GetTaskResultResponse {
    #[serde(rename = "errorId")]
    pub error_id: i32,
    #[serde(rename = "errorCode")]
    pub error_code: Option<String>,
    #[serde(rename = "errorDescription")]
    pub error_description: Option<String>,
    pub status: Option<String>,
    pub solution: Option<TaskSolution>,
}

impl GetTaskResultResponse {
    pub fn is_ready(&self) -> bool {
        self.status.as_deref() == Some("ready")
    }

    pub fn token(&self) -> Option<&str> {
        self.solution
            .as_ref()
            .and_then(|s| s.g_recaptcha_response.as_deref().or(s.token.as_deref()))
    }
}

/// Solution payload: reCAPTCHA tokens arrive as `gRecaptchaResponse`, hCaptcha
/// tokens as `token`.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct TaskSolution {
    #[serde(rename = "gRecaptchaResponse")]
    pub g_recaptcha_response: Option<String>,
    pub token: Option<String>,
}

/// Balance query request
#[derive(Debug, Serialize)]
pub struct GetBalanceRequest {
    #[serde(rename = "clientKey")]
    pub client_key: String,
}

/// Balance query response
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct GetBalanceResponse {
    #[serde(rename = "errorId")]
    pub error_id: i32,
    pub balance: Option<f64>,
}

/// Challenge resolution error types
#[derive(Debug, thiserror::Error)]
pub enum CaptchaError {
    #[error("API key not configured")]
    ApiKeyMissing,

    #[error("Solving service error: {0}")]
    ApiError(String),

    #[error("Task creation failed: {0}")]
    TaskCreationFailed(String),

    #[error("Solve timeout after {0}s")]
    Timeout(u64),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_descriptor_serializes_with_service_type_tag() {
        let request = ChallengeRequest::recaptcha_v2("sitekey-123", "https://example.com/page");
        let descriptor = TaskDescriptor::from_request(&request);
        let json = serde_json::to_value(&descriptor).unwrap();

        assert_eq!(json["type"], "ReCaptchaV2TaskProxyLess");
        assert_eq!(json["websiteURL"], "https://example.com/page");
        assert_eq!(json["websiteKey"], "sitekey-123");
    }

    #[test]
    fn result_token_prefers_recaptcha_field() {
        let response: GetTaskResultResponse = serde_json::from_str(
            r#"{"status":"ready","solution":{"gRecaptchaResponse":"tok-a","token":"tok-b"}}"#,
        )
        .unwrap();
        assert!(response.is_ready());
        assert_eq!(response.token(), Some("tok-a"));
    }

    #[test]
    fn result_token_falls_back_to_hcaptcha_field() {
        let response: GetTaskResultResponse =
            serde_json::from_str(r#"{"status":"ready","solution":{"token":"tok-h"}}"#).unwrap();
        assert_eq!(response.token(), Some("tok-h"));
    }
}
