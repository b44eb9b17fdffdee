//! Browser session management
//!
//! Launches and owns the single Chrome instance behind a scrape flow. At most
//! one browser process lives at a time per manager; creating a context closes
//! the previous one first.

use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig, HeadlessMode};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{Headers, SetExtraHttpHeadersParams};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use futures::StreamExt;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::fingerprint;
use super::BrowserError;
use crate::proxy::ProxyPool;

/// Find Chrome/Chromium executable on the system
fn find_chrome() -> Option<PathBuf> {
    let candidates: Vec<PathBuf> = if cfg!(target_os = "windows") {
        let mut paths = vec![
            PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
            PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        ];
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            paths.push(PathBuf::from(format!(
                r"{}\Google\Chrome\Application\chrome.exe",
                local
            )));
        }
        paths
    } else if cfg!(target_os = "macos") {
        vec![PathBuf::from(
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        )]
    } else {
        vec![
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/google-chrome-stable"),
            PathBuf::from("/usr/bin/chromium"),
            PathBuf::from("/usr/bin/chromium-browser"),
        ]
    };

    candidates.into_iter().find(|p| p.exists())
}

/// Configuration for one browser context.
///
/// Immutable once a context is created from it; a fresh value is built on
/// every rotation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// User agent string
    pub user_agent: String,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Proxy descriptor; takes precedence over the rotator draw
    pub proxy: Option<String>,
    /// Run in headless mode
    pub headless: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_agent: fingerprint::USER_AGENT.to_string(),
            viewport_width: 1920,
            viewport_height: 1080,
            proxy: None,
            headless: true,
        }
    }
}

impl SessionConfig {
    /// Fresh config for a context rotation: viewport jittered within ±100px.
    pub fn rotated(headless: bool, proxy: Option<String>) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            viewport_width: (1920 + rng.gen_range(-100..=100i32)) as u32,
            viewport_height: (1080 + rng.gen_range(-100..=100i32)) as u32,
            proxy,
            headless,
            ..Default::default()
        }
    }
}

/// Owns the active browser process and its event-handler task.
pub struct SessionManager {
    browser: Option<(Browser, JoinHandle<()>)>,
    proxies: ProxyPool,
}

impl SessionManager {
    pub fn new(proxies: ProxyPool) -> Self {
        Self { browser: None, proxies }
    }

    /// Launch a fresh browser context from `config` and return its page.
    ///
    /// Any previously held browser is closed first. The fingerprint headers
    /// and the stealth script are applied before the page is handed out.
    pub async fn create_context(&mut self, config: &SessionConfig) -> Result<Page, BrowserError> {
        self.close().await;

        let chrome_path = find_chrome().ok_or_else(|| {
            BrowserError::LaunchFailed(
                "Chrome not found. Install Google Chrome or Chromium and retry.".to_string(),
            )
        })?;

        let proxy = config.proxy.clone().or_else(|| self.proxies.next());

        info!(
            "Launching browser context ({}x{}, headless: {}, proxy: {})",
            config.viewport_width,
            config.viewport_height,
            config.headless,
            proxy.is_some()
        );

        let mut builder = BrowserConfig::builder()
            .request_timeout(Duration::from_secs(60))
            .chrome_executable(chrome_path)
            .window_size(config.viewport_width, config.viewport_height)
            .arg(format!("--user-agent={}", config.user_agent))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-sandbox")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-infobars")
            .arg("--disable-web-security")
            .arg("--disable-features=IsolateOrigins,site-per-process")
            .arg("--disable-site-isolation-trials")
            .arg("--disable-component-extensions-with-background-pages")
            .arg("--disable-default-apps")
            .arg("--disable-extensions")
            .arg("--disable-background-networking");

        builder = if config.headless {
            builder.headless_mode(HeadlessMode::New)
        } else {
            builder.with_head()
        };

        if let Some(ref proxy) = proxy {
            builder = builder.arg(format!("--proxy-server={proxy}"));
        }

        let browser_config = builder
            .build()
            .map_err(BrowserError::LaunchFailed)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        // When the handler stream ends, Chrome has disconnected
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler event error: {e:?}");
                }
            }
            warn!("Browser event handler ended (Chrome disconnected)");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        apply_fingerprint(&page, &config.user_agent).await?;

        self.browser = Some((browser, handler_task));
        Ok(page)
    }

    /// Close the active browser, if any.
    pub async fn close(&mut self) {
        if let Some((mut browser, handler)) = self.browser.take() {
            let _ = browser.close().await;
            let _ = browser.wait().await;
            handler.abort();
            info!("Browser context closed");
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some((_, handler)) = self.browser.take() {
            // Browser::drop kills the Chrome process; only the handler task
            // needs explicit cleanup here.
            handler.abort();
        }
    }
}

/// Apply the CDP user-agent override, the Chrome-shaped extra headers, and the
/// stealth script to a fresh page.
async fn apply_fingerprint(page: &Page, user_agent: &str) -> Result<(), BrowserError> {
    let ua_params = SetUserAgentOverrideParams::builder()
        .user_agent(user_agent)
        .accept_language("en-US,en;q=0.9")
        .platform("Win32")
        .build()
        .map_err(BrowserError::LaunchFailed)?;

    page.execute(ua_params)
        .await
        .map_err(|e| BrowserError::LaunchFailed(format!("Failed to set UA override: {e}")))?;

    let extra_headers = SetExtraHttpHeadersParams::new(Headers::new(fingerprint::chrome_headers()));
    page.execute(extra_headers)
        .await
        .map_err(|e| BrowserError::LaunchFailed(format!("Failed to set extra headers: {e}")))?;

    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
        fingerprint::STEALTH_JS,
    ))
    .await
    .map_err(|e| BrowserError::LaunchFailed(format!("Failed to register stealth script: {e}")))?;

    debug!("Fingerprint applied (UA, headers, stealth script)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotated_config_jitters_viewport_within_bounds() {
        for _ in 0..100 {
            let config = SessionConfig::rotated(true, None);
            assert!((1820..=2020).contains(&config.viewport_width));
            assert!((980..=1180).contains(&config.viewport_height));
            assert!(config.headless);
            assert!(config.proxy.is_none());
        }
    }

    #[test]
    fn rotated_config_carries_proxy() {
        let config = SessionConfig::rotated(false, Some("http://u:p@proxy:8080".into()));
        assert_eq!(config.proxy.as_deref(), Some("http://u:p@proxy:8080"));
        assert!(!config.headless);
    }
}
