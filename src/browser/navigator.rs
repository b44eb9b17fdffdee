//! Navigation state machine with retry and context rotation
//!
//! Drives one target URL through `Navigating -> PostLoadChecks -> Interacting
//! -> Done`. Any error in the first three states triggers a full context
//! rotation (fresh jittered viewport, next proxy, new browser) until the
//! attempt ceiling is reached, after which the error is fatal for the target.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::network::{EventResponseReceived, ResourceType};
use chromiumoxide::Page;
use futures::StreamExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::humanize::{self, Point};
use super::session::{SessionConfig, SessionManager};
use super::BrowserError;
use crate::captcha::{self, CaptchaSolver, ChallengeOutcome};

/// Full-page load ceiling
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Response statuses treated as block signals
const BLOCK_STATUSES: [i64; 3] = [403, 429, 503];

/// Settle pause after a challenge was solved
const CHALLENGE_SETTLE: Duration = Duration::from_secs(2);

/// Anchor point for the post-load pointer move
const POINTER_ANCHOR: Point = Point { x: 100.0, y: 100.0 };

const INTERACTIVE_SELECTOR: &str = "a, button, input[type='submit']";

fn is_block_status(status: i64) -> bool {
    BLOCK_STATUSES.contains(&status)
}

/// One observed network response
#[derive(Debug, Clone)]
pub struct ObservedResponse {
    pub url: String,
    pub status: i64,
    pub is_document: bool,
}

/// Shared record of the responses observed on the active page.
///
/// Filled by a background listener for the lifetime of one navigation attempt;
/// read by block detection and by the challenge detector.
#[derive(Clone, Default)]
pub struct ResponseLog {
    inner: Arc<Mutex<Vec<ObservedResponse>>>,
}

impl ResponseLog {
    fn push(&self, response: ObservedResponse) {
        if let Ok(mut log) = self.inner.lock() {
            log.push(response);
        }
    }

    /// Status of the first document response, i.e. the page load itself.
    pub fn document_status(&self) -> Option<i64> {
        self.inner
            .lock()
            .ok()?
            .iter()
            .find(|r| r.is_document)
            .map(|r| r.status)
    }

    /// Whether any observed URL carries a challenge marker.
    pub fn has_challenge_url(&self) -> bool {
        self.inner
            .lock()
            .map(|log| {
                log.iter().any(|r| {
                    let url = r.url.to_lowercase();
                    url.contains("captcha") || url.contains("challenge")
                })
            })
            .unwrap_or(false)
    }
}

/// Retry/rotation policy for the state machine.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryPolicy {
    /// Whether the attempt numbered `attempt` (1-based) may be followed by
    /// another one.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// States of one navigation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NavState {
    Navigating,
    PostLoadChecks,
    Interacting,
    Done,
}

/// Final navigation outcome, returned from the `Done` state.
#[derive(Debug, Clone)]
pub struct NavOutcome {
    /// Status of the document response, when one was observed
    pub status: Option<i64>,
    /// URL the page ended up on
    pub final_url: String,
    /// What the challenge pass concluded
    pub challenge: ChallengeOutcome,
}

/// Orchestrates page load, retry, humanized interaction, and challenge
/// resolution for one target URL.
pub struct NavigationController<'a> {
    sessions: &'a mut SessionManager,
    solver: Option<&'a CaptchaSolver>,
    headless: bool,
    policy: RetryPolicy,
}

impl<'a> NavigationController<'a> {
    pub fn new(
        sessions: &'a mut SessionManager,
        solver: Option<&'a CaptchaSolver>,
        headless: bool,
    ) -> Self {
        Self {
            sessions,
            solver,
            headless,
            policy: RetryPolicy::default(),
        }
    }

    /// Drive `url` through the evasion state machine.
    ///
    /// Takes the page of the current context and returns the (possibly
    /// rotated) page together with the navigation outcome.
    pub async fn navigate(
        &mut self,
        mut page: Page,
        url: &str,
    ) -> Result<(Page, NavOutcome), BrowserError> {
        let mut attempt = 1u32;
        loop {
            match self.attempt(&page, url).await {
                Ok(outcome) => {
                    info!(attempt, url, "Navigation complete");
                    return Ok((page, outcome));
                }
                Err(err) if self.policy.should_retry(attempt) => {
                    warn!(attempt, error = %err, "Navigation attempt failed, rotating context");
                    attempt += 1;
                    let config = SessionConfig::rotated(self.headless, None);
                    page = self.sessions.create_context(&config).await?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One pass through the state machine on the given page.
    async fn attempt(&self, page: &Page, url: &str) -> Result<NavOutcome, BrowserError> {
        let log = ResponseLog::default();
        let listener = spawn_response_listener(page, log.clone()).await?;

        let result = self.run_states(page, url, &log).await;

        listener.abort();
        result
    }

    async fn run_states(
        &self,
        page: &Page,
        url: &str,
        log: &ResponseLog,
    ) -> Result<NavOutcome, BrowserError> {
        let mut state = NavState::Navigating;
        let mut status = None;
        let mut challenge = ChallengeOutcome::NotDetected;

        loop {
            state = match state {
                NavState::Navigating => {
                    status = self.load(page, url, log).await?;
                    NavState::PostLoadChecks
                }
                NavState::PostLoadChecks => {
                    challenge = self.post_load_checks(page, log).await?;
                    NavState::Interacting
                }
                NavState::Interacting => {
                    self.interact(page).await?;
                    NavState::Done
                }
                NavState::Done => {
                    let final_url = page
                        .url()
                        .await
                        .ok()
                        .flatten()
                        .unwrap_or_else(|| url.to_string());
                    return Ok(NavOutcome {
                        status,
                        final_url,
                        challenge,
                    });
                }
            };
        }
    }

    /// Full-page load with the fixed timeout; a block status raises.
    async fn load(
        &self,
        page: &Page,
        url: &str,
        log: &ResponseLog,
    ) -> Result<Option<i64>, BrowserError> {
        debug!(url, "Navigating");

        tokio::time::timeout(NAVIGATION_TIMEOUT, async {
            page.goto(url)
                .await
                .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
            page.wait_for_navigation()
                .await
                .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
            Ok::<(), BrowserError>(())
        })
        .await
        .map_err(|_| {
            BrowserError::Timeout(format!(
                "Page load exceeded {}s",
                NAVIGATION_TIMEOUT.as_secs()
            ))
        })??;

        let status = log.document_status();
        if let Some(code) = status {
            if is_block_status(code) {
                return Err(BrowserError::Blocked(code as u16));
            }
        }

        Ok(status)
    }

    /// Settle pause, then the challenge pass; an extra pause when solved.
    async fn post_load_checks(
        &self,
        page: &Page,
        log: &ResponseLog,
    ) -> Result<ChallengeOutcome, BrowserError> {
        let settle = {
            let mut rng = rand::thread_rng();
            rng.gen_range(800..=2500)
        };
        tokio::time::sleep(Duration::from_millis(settle)).await;

        let outcome = captcha::detect_and_solve(page, log, self.solver).await;
        if outcome.solved() {
            info!("Challenge solved, letting the page react");
            tokio::time::sleep(CHALLENGE_SETTLE).await;
        } else {
            debug!("Challenge pass: {outcome:?}");
        }

        Ok(outcome)
    }

    /// Humanized scroll, anchor move, and a click on the first interactive
    /// element if one exists. Best-effort: has no effect on the outcome, but
    /// failures here feed the same retry policy as navigation failures.
    async fn interact(&self, page: &Page) -> Result<(), BrowserError> {
        humanize::scroll(page).await?;
        humanize::mouse_move(page, POINTER_ANCHOR).await?;

        let elements = page
            .find_elements(INTERACTIVE_SELECTOR)
            .await
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;

        if let Some(first) = elements.into_iter().next() {
            match first.clickable_point().await {
                Ok(point) => {
                    humanize::click_at(page, Point::new(point.x, point.y)).await?;
                }
                Err(e) => debug!("First interactive element has no clickable point: {e}"),
            }
        }

        Ok(())
    }
}

/// Start collecting network responses into `log` for the active page.
async fn spawn_response_listener(
    page: &Page,
    log: ResponseLog,
) -> Result<JoinHandle<()>, BrowserError> {
    let mut events = page
        .event_listener::<EventResponseReceived>()
        .await
        .map_err(|e| BrowserError::NavigationFailed(format!("response listener: {e}")))?;

    Ok(tokio::spawn(async move {
        while let Some(event) = events.next().await {
            log.push(ObservedResponse {
                url: event.response.url.clone(),
                status: event.response.status,
                is_document: event.r#type == ResourceType::Document,
            });
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed(url: &str, status: i64, is_document: bool) -> ObservedResponse {
        ObservedResponse {
            url: url.to_string(),
            status,
            is_document,
        }
    }

    #[test]
    fn retry_policy_allows_exactly_three_attempts() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn block_statuses_cover_the_retryable_codes() {
        for status in [403, 429, 503] {
            assert!(is_block_status(status));
        }
        for status in [200, 301, 404, 500] {
            assert!(!is_block_status(status));
        }
    }

    #[test]
    fn document_status_picks_the_page_load() {
        let log = ResponseLog::default();
        log.push(observed("https://cdn.example.com/app.js", 200, false));
        log.push(observed("https://example.com/", 503, true));
        log.push(observed("https://example.com/other", 200, true));

        assert_eq!(log.document_status(), Some(503));
    }

    #[test]
    fn challenge_urls_are_matched_case_insensitively() {
        let log = ResponseLog::default();
        log.push(observed("https://example.com/app.js", 200, false));
        assert!(!log.has_challenge_url());

        log.push(observed("https://example.com/CAPTCHA/api.js", 200, false));
        assert!(log.has_challenge_url());

        let log = ResponseLog::default();
        log.push(observed("https://cdn.example.com/Challenge-platform/x", 200, false));
        assert!(log.has_challenge_url());
    }
}
