//! sitegrab
//!
//! Automated retrieval of a rendered page behind bot detection: evasive
//! navigation with retry and context rotation, visual-challenge resolution
//! through an external solving service, content extraction, and classified
//! asset download to a domain-scoped directory tree.

pub mod browser;
pub mod captcha;
pub mod download;
pub mod extract;
pub mod proxy;
pub mod scraper;
pub mod storage;

use std::path::Path;

pub use scraper::{ScrapeReport, Scraper, ScraperConfig};

/// Truncate a string for display without splitting a multi-byte character.
pub fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Initialize logging: a console layer filtered by `RUST_LOG`, plus a daily
/// file layer under `log_dir` when one is given.
pub fn init_logging(log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    if let Some(log_dir) = log_dir {
        let _ = std::fs::create_dir_all(log_dir);
        let file_appender = tracing_appender::rolling::daily(log_dir, "sitegrab.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_truncate_respects_char_boundaries() {
        assert_eq!(safe_truncate("hello", 10), "hello");
        assert_eq!(safe_truncate("hello", 3), "hel");
        // 'é' is two bytes; truncating inside it must back off
        assert_eq!(safe_truncate("café", 4), "caf");
    }
}
