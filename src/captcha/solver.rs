//! Solving-service client
//!
//! Dispatches challenge tasks to the external solving service and polls for
//! the solution token.

use std::time::{Duration, Instant};

use reqwest::Client;
use tracing::{debug, info};

use super::types::*;

/// Default solving-service endpoint
const SOLVER_ENDPOINT: &str = "https://api.capsolver.com";

/// Challenge solver backed by the external solving service
pub struct CaptchaSolver {
    api_key: String,
    endpoint: String,
    client: Client,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl CaptchaSolver {
    /// Create a new solver
    pub fn new(api_key: &str) -> Result<Self, CaptchaError> {
        if api_key.is_empty() {
            return Err(CaptchaError::ApiKeyMissing);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CaptchaError::NetworkError(e.to_string()))?;

        Ok(Self {
            api_key: api_key.to_string(),
            endpoint: SOLVER_ENDPOINT.to_string(),
            client,
            poll_interval: Duration::from_secs(2),
            max_poll_attempts: 30,
        })
    }

    /// Point the solver at a different service endpoint
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    /// Set poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set maximum number of result polls
    pub fn with_max_poll_attempts(mut self, attempts: u32) -> Self {
        self.max_poll_attempts = attempts;
        self
    }

    /// Solve a challenge: create a task, then poll until the token is ready or
    /// the attempt ceiling is reached.
    pub async fn solve(&self, request: &ChallengeRequest) -> Result<CaptchaToken, CaptchaError> {
        let start = Instant::now();

        info!(
            "Solving {} challenge for {}",
            request.kind.task_type(),
            request.page_url
        );

        let task_id = self.create_task(request).await?;
        debug!("Created task ID: {}", task_id);

        for _ in 0..self.max_poll_attempts {
            tokio::time::sleep(self.poll_interval).await;

            match self.get_result(&task_id).await? {
                Some(token) => {
                    let solve_time_ms = start.elapsed().as_millis() as u64;
                    info!("Challenge solved in {}ms", solve_time_ms);
                    return Ok(CaptchaToken { token, solve_time_ms });
                }
                None => {
                    debug!("Task {} still processing...", task_id);
                }
            }
        }

        let ceiling = self.poll_interval.as_secs() * u64::from(self.max_poll_attempts);
        Err(CaptchaError::Timeout(ceiling))
    }

    /// Get account balance from the solving service
    pub async fn balance(&self) -> Result<f64, CaptchaError> {
        let url = format!("{}/getBalance", self.endpoint);

        let request = GetBalanceRequest {
            client_key: self.api_key.clone(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CaptchaError::NetworkError(e.to_string()))?;

        let result: GetBalanceResponse = response
            .json()
            .await
            .map_err(|e| CaptchaError::InvalidResponse(e.to_string()))?;

        if result.error_id != 0 {
            return Err(CaptchaError::ApiError(format!("errorId={}", result.error_id)));
        }

        result
            .balance
            .ok_or_else(|| CaptchaError::InvalidResponse("No balance in response".into()))
    }

    /// Create a task with the solving service
    async fn create_task(&self, request: &ChallengeRequest) -> Result<String, CaptchaError> {
        let url = format!("{}/createTask", self.endpoint);

        let create_request = CreateTaskRequest {
            client_key: self.api_key.clone(),
            task: TaskDescriptor::from_request(request),
        };

        let response = self
            .client
            .post(&url)
            .json(&create_request)
            .send()
            .await
            .map_err(|e| CaptchaError::NetworkError(e.to_string()))?;

        let response_text = response
            .text()
            .await
            .map_err(|e| CaptchaError::NetworkError(e.to_string()))?;

        let result: CreateTaskResponse = serde_json::from_str(&response_text).map_err(|e| {
            CaptchaError::InvalidResponse(format!(
                "Parse error: {} - Response: {}",
                e,
                crate::safe_truncate(&response_text, 200)
            ))
        })?;

        if result.error_id != 0 {
            let error_msg = format!(
                "errorId={}, code={}, desc={}",
                result.error_id,
                result.error_code.as_deref().unwrap_or("none"),
                result.error_description.as_deref().unwrap_or("none")
            );
            return Err(CaptchaError::TaskCreationFailed(error_msg));
        }

        result
            .task_id
            .ok_or_else(|| CaptchaError::InvalidResponse("No task ID in response".into()))
    }

    /// Poll one task result. `Ok(None)` means still processing.
    async fn get_result(&self, task_id: &str) -> Result<Option<String>, CaptchaError> {
        let url = format!("{}/getTaskResult", self.endpoint);

        let request = GetTaskResultRequest {
            client_key: self.api_key.clone(),
            task_id: task_id.to_string(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CaptchaError::NetworkError(e.to_string()))?;

        let result: GetTaskResultResponse = response
            .json()
            .await
            .map_err(|e| CaptchaError::InvalidResponse(e.to_string()))?;

        if result.error_id != 0 {
            let error_msg = result
                .error_description
                .or(result.error_code)
                .unwrap_or_else(|| format!("Error ID: {}", result.error_id));
            return Err(CaptchaError::ApiError(error_msg));
        }

        if result.is_ready() {
            if let Some(token) = result.token() {
                return Ok(Some(token.to_string()));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_solver(endpoint: &str) -> CaptchaSolver {
        CaptchaSolver::new("test-key")
            .unwrap()
            .with_endpoint(endpoint)
            .with_poll_interval(Duration::from_millis(1))
    }

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(matches!(
            CaptchaSolver::new(""),
            Err(CaptchaError::ApiKeyMissing)
        ));
    }

    #[tokio::test]
    async fn solve_returns_token_once_ready() {
        let mut server = mockito::Server::new_async().await;

        let create = server
            .mock("POST", "/createTask")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"clientKey":"test-key","task":{"type":"ReCaptchaV2TaskProxyLess"}}"#.into(),
            ))
            .with_body(r#"{"errorId":0,"taskId":"task-1"}"#)
            .create_async()
            .await;

        let ready = server
            .mock("POST", "/getTaskResult")
            .with_body(
                r#"{"errorId":0,"status":"ready","solution":{"gRecaptchaResponse":"tok-xyz"}}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let solver = test_solver(&server.url());
        let request = ChallengeRequest::recaptcha_v2("sk", "https://example.com");
        let result = solver.solve(&request).await.unwrap();

        assert_eq!(result.token, "tok-xyz");
        create.assert_async().await;
        ready.assert_async().await;
    }

    #[tokio::test]
    async fn solve_times_out_when_never_ready() {
        let mut server = mockito::Server::new_async().await;

        server
            .mock("POST", "/createTask")
            .with_body(r#"{"errorId":0,"taskId":"task-2"}"#)
            .create_async()
            .await;

        server
            .mock("POST", "/getTaskResult")
            .with_body(r#"{"errorId":0,"status":"processing"}"#)
            .expect(5)
            .create_async()
            .await;

        let solver = test_solver(&server.url()).with_max_poll_attempts(5);
        let request = ChallengeRequest::hcaptcha("sk", "https://example.com");

        assert!(matches!(
            solver.solve(&request).await,
            Err(CaptchaError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn missing_task_id_fails_task_creation() {
        let mut server = mockito::Server::new_async().await;

        server
            .mock("POST", "/createTask")
            .with_body(r#"{"errorId":0}"#)
            .create_async()
            .await;

        let solver = test_solver(&server.url());
        let request = ChallengeRequest::recaptcha_v2("sk", "https://example.com");

        assert!(matches!(
            solver.solve(&request).await,
            Err(CaptchaError::InvalidResponse(_))
        ));
    }
}
