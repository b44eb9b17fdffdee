//! Persistence of extracted content and downloaded assets
//!
//! Output layout: `output root / sanitized-domain / {images,videos,documents,
//! other}/` plus a `content.json` record. Per-asset failures are absorbed;
//! only domain-directory creation failure propagates.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::download::AssetDownloader;
use crate::extract::ExtractedContent;

const MAX_FILENAME_BYTES: usize = 255;

/// Buckets that get their URLs materialized, with the default extension used
/// when a filename carries none.
const DOWNLOAD_BUCKETS: [(&str, &str); 3] =
    [("images", "jpg"), ("videos", "mp4"), ("documents", "pdf")];

fn replace_disallowed(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Sanitize a filename for on-disk use.
///
/// Strips directory components, replaces anything outside `[A-Za-z0-9_.-]`
/// with `_`, substitutes a generated unique name for empty or `.`/`..`
/// results, appends `default_ext` when no extension is present, and bounds the
/// result to 255 bytes. Idempotent, and never emits a path separator.
pub fn sanitize_filename(name: &str, default_ext: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let mut cleaned = replace_disallowed(base);

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        cleaned = format!("{}.{}", Uuid::new_v4(), default_ext);
    }

    if !cleaned.contains('.') {
        cleaned = format!("{cleaned}.{default_ext}");
    }

    // Replacement left only single-byte characters, so this cannot split a
    // character.
    cleaned.truncate(MAX_FILENAME_BYTES);
    cleaned
}

/// Saved/rejected tallies for one bucket
#[derive(Debug, Clone, Copy, Default)]
pub struct BucketCounts {
    pub saved: usize,
    pub rejected: usize,
}

/// Per-bucket download report, feeding the CLI summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssetReport {
    pub images: BucketCounts,
    pub videos: BucketCounts,
    pub documents: BucketCounts,
}

impl AssetReport {
    fn bucket_mut(&mut self, bucket: &str) -> &mut BucketCounts {
        match bucket {
            "images" => &mut self.images,
            "videos" => &mut self.videos,
            _ => &mut self.documents,
        }
    }

    pub fn total_saved(&self) -> usize {
        self.images.saved + self.videos.saved + self.documents.saved
    }
}

/// Serializes extracted content and assets into the domain-scoped tree.
pub struct ContentWriter {
    output_root: PathBuf,
}

impl ContentWriter {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    /// Create the domain directory tree. Failure here is fatal for the target.
    pub fn prepare_domain_dir(&self, domain: &str) -> io::Result<PathBuf> {
        let domain_dir = self.output_root.join(replace_disallowed(domain));

        for bucket in ["images", "videos", "documents", "other"] {
            std::fs::create_dir_all(domain_dir.join(bucket))?;
        }

        Ok(domain_dir)
    }

    /// Write `content.json` into the domain directory.
    pub fn write_record(&self, domain_dir: &Path, content: &ExtractedContent) -> io::Result<()> {
        let json = serde_json::to_string_pretty(content).map_err(io::Error::other)?;
        std::fs::write(domain_dir.join("content.json"), json)?;
        info!("Content record written to {}", domain_dir.display());
        Ok(())
    }

    /// Fetch every downloadable asset sequentially, with a randomized
    /// 0.1-0.5s pause between fetches. Rejections are tallied, never fatal.
    pub async fn download_assets(
        &self,
        domain_dir: &Path,
        content: &ExtractedContent,
        downloader: &AssetDownloader,
    ) -> AssetReport {
        let mut report = AssetReport::default();

        for (bucket, default_ext) in DOWNLOAD_BUCKETS {
            let urls = match bucket {
                "images" => &content.links.images,
                "videos" => &content.links.videos,
                _ => &content.links.documents,
            };

            for url in urls {
                let source_name = Url::parse(url)
                    .map(|u| u.path().to_string())
                    .unwrap_or_else(|_| url.clone());
                let filename = sanitize_filename(&source_name, default_ext);
                let dest = domain_dir.join(bucket).join(filename);

                let outcome = downloader.fetch(url, &dest).await;
                let counts = report.bucket_mut(bucket);
                if outcome.saved() {
                    counts.saved += 1;
                } else {
                    warn!(url = %url, "Asset rejected");
                    counts.rejected += 1;
                }

                let pause = rand::thread_rng().gen_range(100..=500);
                tokio::time::sleep(Duration::from_millis(pause)).await;
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitization_is_idempotent() {
        for name in [
            "photo.jpg",
            "weird name (1).png",
            "../../etc/passwd",
            "no_extension",
            &"a".repeat(300),
            "",
            ".",
            "..",
        ] {
            let once = sanitize_filename(name, "bin");
            let twice = sanitize_filename(&once, "bin");
            assert_eq!(once, twice, "not idempotent for {name:?}");
        }
    }

    #[test]
    fn path_separators_never_survive() {
        for name in ["a/b/c.png", r"a\b\c.png", "/abs/path.gif", r"C:\x\y.jpg"] {
            let sanitized = sanitize_filename(name, "bin");
            assert!(!sanitized.contains('/'));
            assert!(!sanitized.contains('\\'));
        }
    }

    #[test]
    fn output_is_bounded_to_255_bytes() {
        let long = "a".repeat(400);
        assert!(sanitize_filename(&long, "bin").len() <= 255);

        let long_with_ext = format!("{}.png", "b".repeat(400));
        assert!(sanitize_filename(&long_with_ext, "bin").len() <= 255);
    }

    #[test]
    fn degenerate_names_get_generated_replacements() {
        for name in ["", ".", ".."] {
            let sanitized = sanitize_filename(name, "pdf");
            assert!(sanitized.ends_with(".pdf"), "{sanitized}");
            assert!(sanitized.len() > 4);
        }
    }

    #[test]
    fn missing_extension_gains_the_default() {
        assert_eq!(sanitize_filename("report", "pdf"), "report.pdf");
        assert_eq!(sanitize_filename("archive.zip", "pdf"), "archive.zip");
    }

    #[test]
    fn disallowed_characters_become_underscores() {
        assert_eq!(sanitize_filename("my photo (1).jpg", "bin"), "my_photo__1_.jpg");
        assert_eq!(sanitize_filename("naïve.png", "bin"), "na_ve.png");
    }

    #[test]
    fn domain_dir_contains_all_buckets() {
        let root = tempfile::tempdir().unwrap();
        let writer = ContentWriter::new(root.path());

        let dir = writer.prepare_domain_dir("sub.example.com:8080").unwrap();
        assert!(dir.ends_with("sub.example.com_8080"));
        for bucket in ["images", "videos", "documents", "other"] {
            assert!(dir.join(bucket).is_dir());
        }
    }

    #[test]
    fn record_round_trips_through_content_json() {
        use crate::extract::{LinkClassification, RawLink};

        let root = tempfile::tempdir().unwrap();
        let writer = ContentWriter::new(root.path());
        let dir = writer.prepare_domain_dir("example.com").unwrap();

        let content = ExtractedContent {
            title: "T".into(),
            url: "https://example.com".into(),
            text: "hello\nworld".into(),
            links: crate::extract::classify(vec![
                RawLink::new("img", "https://example.com/a.jpg"),
                RawLink::new("a", "https://example.com/doc.pdf"),
            ]),
        };
        writer.write_record(&dir, &content).unwrap();

        let raw = std::fs::read_to_string(dir.join("content.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["title"], "T");
        assert_eq!(parsed["links"]["images"][0], "https://example.com/a.jpg");
        assert_eq!(parsed["links"]["documents"][0], "https://example.com/doc.pdf");
        let _unused: LinkClassification = serde_json::from_value(parsed["links"].clone()).unwrap();
    }
}
