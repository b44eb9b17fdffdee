//! Top-level scrape orchestration
//!
//! One `Scraper` instance per logical scraping flow: it owns the session
//! manager, the proxy cursor, the solver, and the writer. Callers wanting
//! parallel targets instantiate one orchestrator per target.

use std::path::PathBuf;

use chromiumoxide::Page;
use tracing::{info, warn};
use url::Url;

use crate::browser::{BrowserError, NavOutcome, NavigationController, SessionConfig, SessionManager};
use crate::captcha::CaptchaSolver;
use crate::download::AssetDownloader;
use crate::extract::{self, ExtractedContent};
use crate::proxy::ProxyPool;
use crate::storage::{AssetReport, ContentWriter};

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Root directory for persisted output
    pub output_dir: PathBuf,
    /// Proxy descriptor pool, drawn round-robin on every rotation
    pub proxies: Vec<String>,
    /// Run the browser headless
    pub headless: bool,
    /// Solving-service API key; challenges stay unsolved without one
    pub solver_api_key: Option<String>,
    /// Solving-service endpoint override
    pub solver_endpoint: Option<String>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./output"),
            proxies: Vec::new(),
            headless: true,
            solver_api_key: None,
            solver_endpoint: None,
        }
    }
}

/// What one completed target produced.
#[derive(Debug, Clone)]
pub struct ScrapeReport {
    pub content: ExtractedContent,
    pub assets: AssetReport,
    pub outcome: NavOutcome,
}

/// Drives one target URL end to end.
pub struct Scraper {
    config: ScraperConfig,
    sessions: SessionManager,
    solver: Option<CaptchaSolver>,
    downloader: AssetDownloader,
    writer: ContentWriter,
}

impl Scraper {
    pub fn new(config: ScraperConfig) -> Self {
        let sessions = SessionManager::new(ProxyPool::new(config.proxies.clone()));

        let solver = config.solver_api_key.as_deref().and_then(|key| {
            match CaptchaSolver::new(key) {
                Ok(solver) => Some(match config.solver_endpoint.as_deref() {
                    Some(endpoint) => solver.with_endpoint(endpoint),
                    None => solver,
                }),
                Err(e) => {
                    warn!("Solver disabled: {e}");
                    None
                }
            }
        });

        let downloader = AssetDownloader::new();
        let writer = ContentWriter::new(config.output_dir.clone());

        Self {
            config,
            sessions,
            solver,
            downloader,
            writer,
        }
    }

    /// Fetch, extract, and persist one target. The browser is closed before
    /// returning, success or not.
    pub async fn scrape_target(&mut self, url: &str) -> Result<ScrapeReport, BrowserError> {
        let target = Url::parse(url)
            .map_err(|e| BrowserError::NavigationFailed(format!("invalid target URL: {e}")))?;
        let domain = target.host_str().unwrap_or("unknown").to_string();

        let session_config = SessionConfig::rotated(self.config.headless, None);
        let page = self.sessions.create_context(&session_config).await?;

        let result = self.run(page, url, &domain).await;
        self.sessions.close().await;
        result
    }

    async fn run(
        &mut self,
        page: Page,
        url: &str,
        domain: &str,
    ) -> Result<ScrapeReport, BrowserError> {
        let mut navigator =
            NavigationController::new(&mut self.sessions, self.solver.as_ref(), self.config.headless);
        let (page, outcome) = navigator.navigate(page, url).await?;

        let content = extract::extract(&page, url).await?;
        info!(
            "Extracted '{}': {} images, {} videos, {} documents, {} other",
            content.title,
            content.links.images.len(),
            content.links.videos.len(),
            content.links.documents.len(),
            content.links.other.len()
        );

        let domain_dir = self.writer.prepare_domain_dir(domain)?;
        self.writer.write_record(&domain_dir, &content)?;

        let assets = self
            .writer
            .download_assets(&domain_dir, &content, &self.downloader)
            .await;
        info!("Assets saved: {}", assets.total_saved());

        Ok(ScrapeReport {
            content,
            assets,
            outcome,
        })
    }
}
