//! Content extraction and link classification
//!
//! Two independent passes over a loaded page: visible text collection through
//! a tree-walker script, and enumeration of resource links which are then
//! classified in Rust so the partition is directly testable.

use std::time::Duration;

use chromiumoxide::Page;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::browser::BrowserError;

/// Fixed settle delay before reading the page
const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Depth-first walk of visible text nodes, newline joined. Non-visible
/// containers are removed up front; hidden and single-character fragments are
/// dropped.
const VISIBLE_TEXT_JS: &str = r#"
(() => {
    const styleTags = document.querySelectorAll('style, script, noscript, iframe, svg');
    styleTags.forEach(tag => tag.remove());

    const walker = document.createTreeWalker(
        document.body,
        NodeFilter.SHOW_TEXT,
        null,
        false
    );

    let texts = [];
    let node;
    while (node = walker.nextNode()) {
        if (node.parentElement &&
            node.parentElement.style.display !== 'none' &&
            node.parentElement.style.visibility !== 'hidden' &&
            node.parentElement.getAttribute('aria-hidden') !== 'true') {
            const text = node.textContent.trim();
            if (text.length > 1) {
                texts.push(text);
            }
        }
    }
    return texts.join('\n');
})()
"#;

/// Enumerate every element with a resolvable resource URL as `{tag, url}`.
const COLLECT_LINKS_JS: &str = r#"
(() => {
    const results = [];
    const elements = document.querySelectorAll('a[href], img[src], video source[src], video[src], audio[src]');
    for (const el of elements) {
        const url = el.href || el.src;
        if (!url) continue;
        results.push({ tag: el.tagName.toLowerCase(), url: url.toString() });
    }
    return results;
})()
"#;

const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "svg", "ico"];
const VIDEO_EXTS: &[&str] = &["mp4", "webm", "avi", "mov", "mkv", "flv", "wmv"];
const DOCUMENT_EXTS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "zip", "rar", "tar.gz", "dmg", "exe",
];

/// A discovered element reference, as reported by the page.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLink {
    pub tag: String,
    pub url: String,
}

impl RawLink {
    pub fn new(tag: &str, url: &str) -> Self {
        Self {
            tag: tag.to_string(),
            url: url.to_string(),
        }
    }
}

/// Discovered URLs partitioned into four disjoint buckets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkClassification {
    pub images: Vec<String>,
    pub videos: Vec<String>,
    pub documents: Vec<String>,
    pub other: Vec<String>,
}

impl LinkClassification {
    pub fn total(&self) -> usize {
        self.images.len() + self.videos.len() + self.documents.len() + self.other.len()
    }
}

/// The structured record produced from one loaded page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub title: String,
    pub url: String,
    pub text: String,
    pub links: LinkClassification,
}

/// The URL with query and fragment stripped, lowercased, for extension tests.
fn matchable_path(url: &str) -> String {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    url[..end].to_lowercase()
}

fn has_extension(url: &str, extensions: &[&str]) -> bool {
    let path = matchable_path(url);
    extensions.iter().any(|ext| path.ends_with(&format!(".{ext}")))
}

/// Classify discovered links by the fixed rule priority:
/// image-tag-or-extension, then video-tag-or-extension, then
/// document-extension, then plain anchor. Each URL lands in exactly one
/// bucket; elements matching no rule are dropped.
pub fn classify(links: Vec<RawLink>) -> LinkClassification {
    let mut classified = LinkClassification::default();

    for link in links {
        let tag = link.tag.to_lowercase();

        if tag == "img" || has_extension(&link.url, IMAGE_EXTS) {
            classified.images.push(link.url);
        } else if tag == "video" || tag == "source" || has_extension(&link.url, VIDEO_EXTS) {
            classified.videos.push(link.url);
        } else if has_extension(&link.url, DOCUMENT_EXTS) {
            classified.documents.push(link.url);
        } else if tag == "a" && link.url.starts_with("http") {
            classified.other.push(link.url);
        }
    }

    classified
}

/// Read title, visible text, and classified links from a loaded page.
pub async fn extract(page: &Page, base_url: &str) -> Result<ExtractedContent, BrowserError> {
    tokio::time::sleep(SETTLE_DELAY).await;

    let title = page
        .get_title()
        .await
        .map_err(|e| BrowserError::JavaScriptError(format!("title read failed: {e}")))?
        .unwrap_or_default();

    let text: String = page
        .evaluate(VISIBLE_TEXT_JS)
        .await
        .map_err(|e| BrowserError::JavaScriptError(format!("text extraction failed: {e}")))?
        .into_value()
        .unwrap_or_default();

    let raw_links: Vec<RawLink> = page
        .evaluate(COLLECT_LINKS_JS)
        .await
        .map_err(|e| BrowserError::JavaScriptError(format!("link collection failed: {e}")))?
        .into_value()
        .unwrap_or_default();

    debug!(
        "Extracted {} text bytes and {} candidate links",
        text.len(),
        raw_links.len()
    );

    Ok(ExtractedContent {
        title,
        url: base_url.to_string(),
        text,
        links: classify(raw_links),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_extensions_land_in_images_only() {
        for ext in IMAGE_EXTS {
            let url = format!("https://example.com/pic.{ext}");
            let classified = classify(vec![RawLink::new("a", &url)]);
            assert_eq!(classified.images, vec![url]);
            assert!(classified.videos.is_empty());
            assert!(classified.documents.is_empty());
            assert!(classified.other.is_empty());
        }
    }

    #[test]
    fn partition_is_a_disjoint_cover() {
        let links = vec![
            RawLink::new("img", "https://example.com/a.jpg"),
            RawLink::new("a", "https://example.com/b.png"),
            RawLink::new("video", "https://example.com/clip"),
            RawLink::new("source", "https://example.com/clip.webm"),
            RawLink::new("a", "https://example.com/report.pdf"),
            RawLink::new("a", "https://example.com/page"),
        ];
        let total_in = links.len();
        let classified = classify(links);

        assert_eq!(classified.total(), total_in);
        assert_eq!(classified.images.len(), 2);
        assert_eq!(classified.videos.len(), 2);
        assert_eq!(classified.documents.len(), 1);
        assert_eq!(classified.other.len(), 1);
    }

    #[test]
    fn rule_priority_image_before_video_before_document() {
        // an <img> pointing at a .pdf is still an image by tag rule
        let classified = classify(vec![RawLink::new("img", "https://example.com/x.pdf")]);
        assert_eq!(classified.images.len(), 1);
        assert!(classified.documents.is_empty());

        // a .jpg anchor beats the plain-anchor rule
        let classified = classify(vec![RawLink::new("a", "https://example.com/x.jpg")]);
        assert_eq!(classified.images.len(), 1);
        assert!(classified.other.is_empty());
    }

    #[test]
    fn query_strings_do_not_defeat_extension_matching() {
        let classified = classify(vec![RawLink::new("a", "https://example.com/p.jpg?w=200#top")]);
        assert_eq!(classified.images.len(), 1);
    }

    #[test]
    fn non_http_anchors_are_dropped() {
        let classified = classify(vec![
            RawLink::new("a", "mailto:someone@example.com"),
            RawLink::new("a", "javascript:void(0)"),
        ]);
        assert_eq!(classified.total(), 0);
    }

    #[test]
    fn sample_page_shape() {
        // one <img src="a.jpg">, one <a href="doc.pdf">
        let classified = classify(vec![
            RawLink::new("img", "https://t.example/a.jpg"),
            RawLink::new("a", "https://t.example/doc.pdf"),
        ]);
        assert_eq!(classified.images, vec!["https://t.example/a.jpg"]);
        assert_eq!(classified.documents, vec!["https://t.example/doc.pdf"]);
        assert!(classified.videos.is_empty());
        assert!(classified.other.is_empty());
    }

    #[test]
    fn audio_sources_with_document_extensions_stay_documents() {
        let classified = classify(vec![RawLink::new("audio", "https://example.com/a.zip")]);
        assert_eq!(classified.documents.len(), 1);
    }
}
