//! Page processors: the conversion/output stage fed by the crawler

use crate::output::FetchedPage;
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};

/// Downstream stage that turns fetched pages into output
///
/// Called inline by the coordinator, or from pipeline consumer tasks.
pub trait PageProcessor: Send + Sync {
    /// Converts a fetched page into its output representation
    fn convert(&self, page: &FetchedPage) -> anyhow::Result<String>;

    /// Persists converted content, returning where it was written
    fn save(&self, page: &FetchedPage, content: &str) -> anyhow::Result<Option<PathBuf>>;
}

/// Writes the raw HTML of each page to `<root>/pages/<host>/<path>.html`
#[derive(Debug, Clone)]
pub struct HtmlFileWriter {
    root: PathBuf,
}

impl HtmlFileWriter {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            root: output_dir.to_path_buf(),
        }
    }

    /// Output path for a page
    ///
    /// Directory-style URLs (`/guide/`) map to `index.html`; query strings
    /// are folded into the file name so distinct URLs get distinct files.
    pub fn path_for(&self, page: &FetchedPage) -> PathBuf {
        let url = &page.url;
        let host = match url.port() {
            Some(port) => format!("{}_{}", url.host_str().unwrap_or("unknown"), port),
            None => url.host_str().unwrap_or("unknown").to_string(),
        };

        let mut path = self.root.join("pages").join(sanitize(&host));
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty() && *seg != "..").collect())
            .unwrap_or_default();

        let (dirs, file): (&[&str], String) = match segments.split_last() {
            Some((last, dirs)) if !url.path().ends_with('/') => (
                dirs,
                last.trim_end_matches(".html")
                    .trim_end_matches(".htm")
                    .to_string(),
            ),
            _ => (segments.as_slice(), "index".to_string()),
        };
        for dir in dirs {
            path.push(sanitize(dir));
        }

        let mut name = sanitize(&file);
        if let Some(query) = url.query() {
            name.push('_');
            name.push_str(&sanitize(query));
        }
        name.push_str(".html");
        path.push(name);
        path
    }
}

fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl PageProcessor for HtmlFileWriter {
    fn convert(&self, page: &FetchedPage) -> anyhow::Result<String> {
        Ok(page.body_text().into_owned())
    }

    fn save(&self, page: &FetchedPage, content: &str) -> anyhow::Result<Option<PathBuf>> {
        let path = self.path_for(page);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;
        Ok(Some(path))
    }
}

/// Discards pages
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProcessor;

impl PageProcessor for NullProcessor {
    fn convert(&self, _page: &FetchedPage) -> anyhow::Result<String> {
        Ok(String::new())
    }

    fn save(&self, _page: &FetchedPage, _content: &str) -> anyhow::Result<Option<PathBuf>> {
        Ok(None)
    }
}
