//! Passive challenge detection and solution injection
//!
//! Detection is a disjunction over two signals gathered during a fixed
//! observation window: network responses whose URL carries a challenge marker,
//! and DOM nodes matching a fixed selector set. The whole resolve flow is
//! soft: any internal failure collapses into `ChallengeOutcome::Unsolved` and
//! navigation proceeds.

use std::time::Duration;

use chromiumoxide::Page;
use tracing::{debug, info, warn};

use super::solver::CaptchaSolver;
use super::types::{CaptchaError, ChallengeOutcome, ChallengeRequest};
use crate::browser::ResponseLog;

/// Passive observation window before the DOM probe
const DETECTION_WINDOW: Duration = Duration::from_secs(3);

/// Selectors known to host visual challenges
pub const CHALLENGE_SELECTORS: &[&str] = &[
    "iframe[src*=\"recaptcha\"]",
    "iframe[src*=\"hcaptcha\"]",
    "div[class*=\"captcha\"]",
    "div[class*=\"challenge\"]",
    "#captcha",
    "#challenge",
];

const SITEKEY_JS: &str = r#"
(() => {
    const el = document.querySelector('[data-sitekey]');
    return el ? el.getAttribute('data-sitekey') : null;
})()
"#;

/// Writes the token into the hidden response field and fires any registered
/// client callbacks. `__TOKEN__` is the only substitution point.
const RECAPTCHA_INJECT_JS: &str = r#"
(() => {
    const token = __TOKEN__;
    const response = document.getElementById('g-recaptcha-response');
    if (response) {
        response.innerHTML = token;
        response.style.display = 'block';
    }
    if (window.___grecaptcha_cfg && window.___grecaptcha_cfg.clients) {
        Object.values(window.___grecaptcha_cfg.clients).forEach(client => {
            if (client.callback) {
                client.callback(token);
            }
        });
    }
})()
"#;

/// Writes the token into the response input and invokes the captcha library's
/// submit routine.
const HCAPTCHA_INJECT_JS: &str = r#"
(() => {
    const token = __TOKEN__;
    const response = document.querySelector('[name="h-captcha-response"]');
    if (response) response.value = token;
    if (window.hcaptcha) window.hcaptcha.submit();
})()
"#;

/// Check the page for a visual challenge and try to resolve it.
///
/// `responses` is the navigation-long network log; it is re-examined after the
/// detection window has elapsed. Returns a plain outcome, never an error.
pub async fn detect_and_solve(
    page: &Page,
    responses: &ResponseLog,
    solver: Option<&CaptchaSolver>,
) -> ChallengeOutcome {
    tokio::time::sleep(DETECTION_WINDOW).await;

    let mut detected = responses.has_challenge_url();
    if !detected {
        for selector in CHALLENGE_SELECTORS {
            if element_count(page, selector).await > 0 {
                detected = true;
                break;
            }
        }
    }

    if !detected {
        return ChallengeOutcome::NotDetected;
    }

    info!("Challenge markers present, attempting resolution");

    let Some(solver) = solver else {
        warn!("Challenge detected but no solver configured");
        return ChallengeOutcome::Unsolved;
    };

    match resolve(page, solver).await {
        Ok(true) => ChallengeOutcome::Solved,
        Ok(false) => ChallengeOutcome::Unsolved,
        Err(e) => {
            debug!("Challenge resolution failed: {e}");
            ChallengeOutcome::Unsolved
        }
    }
}

/// One resolution attempt. `Ok(false)` means no site key or no recognizable
/// challenge frame; errors are swallowed by the caller.
async fn resolve(page: &Page, solver: &CaptchaSolver) -> Result<bool, CaptchaError> {
    let sitekey: Option<String> = page
        .evaluate(SITEKEY_JS)
        .await
        .map_err(|e| CaptchaError::InvalidResponse(format!("sitekey probe: {e}")))?
        .into_value()
        .unwrap_or(None);

    let Some(sitekey) = sitekey else {
        debug!("No site-key attribute found on challenged page");
        return Ok(false);
    };

    let page_url = page
        .url()
        .await
        .ok()
        .flatten()
        .unwrap_or_default();

    // reCAPTCHA checked first; the branches are mutually exclusive
    if element_count(page, "iframe[src*=\"recaptcha\"]").await > 0 {
        let request = ChallengeRequest::recaptcha_v2(&sitekey, &page_url);
        let solved = solver.solve(&request).await?;
        inject(page, RECAPTCHA_INJECT_JS, &solved.token).await?;
        return Ok(true);
    }

    if element_count(page, "iframe[src*=\"hcaptcha\"]").await > 0 {
        let request = ChallengeRequest::hcaptcha(&sitekey, &page_url);
        let solved = solver.solve(&request).await?;
        inject(page, HCAPTCHA_INJECT_JS, &solved.token).await?;
        return Ok(true);
    }

    Ok(false)
}

/// Evaluate an injection template with the token spliced in as a JSON string.
async fn inject(page: &Page, template: &str, token: &str) -> Result<(), CaptchaError> {
    let literal = serde_json::to_string(token)
        .map_err(|e| CaptchaError::InvalidResponse(format!("token encode: {e}")))?;
    let script = template.replace("__TOKEN__", &literal);

    page.evaluate(script)
        .await
        .map_err(|e| CaptchaError::InvalidResponse(format!("token inject: {e}")))?;

    Ok(())
}

async fn element_count(page: &Page, selector: &str) -> usize {
    page.find_elements(selector)
        .await
        .map(|elements| elements.len())
        .unwrap_or(0)
}
