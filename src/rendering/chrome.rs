//! Headless Chrome renderer driven through its command line.
//!
//! Every pooled page owns a private working directory. Content is staged
//! there on load and printed with `--print-to-pdf` when rendering.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use url::Url;

use super::{PdfByteStream, RendererHandle, WaitPolicy};
use crate::error::EngineError;
use crate::models::{ChromeConfig, PdfOptions};
use crate::services::ResourceFactory;

/// Browser binaries probed on `PATH`, in order
const BROWSER_NAMES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

/// Chunk size used when streaming a rendered PDF
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

const PAGE_FILE: &str = "page.html";
const OUTPUT_FILE: &str = "output.pdf";

/// What a page will print
#[derive(Debug, Clone, PartialEq, Eq)]
enum PageSource {
    Markup(String),
    Address(Url),
}

/// Creates Chrome pages for the renderer pool
pub struct ChromeFactory {
    binary: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ChromeFactory {
    pub fn new(binary: PathBuf, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            binary,
            args,
            timeout,
        }
    }

    /// Build a factory, resolving the browser binary from config, `CHROME_PATH` or `PATH`
    pub fn from_config(config: &ChromeConfig) -> Result<Self, EngineError> {
        let binary = match &config.binary {
            Some(path) => path.clone(),
            None => find_browser().ok_or_else(|| {
                EngineError::Launch(
                    "no Chrome/Chromium binary found; set chrome.binary or CHROME_PATH"
                        .to_string(),
                )
            })?,
        };

        tracing::info!(binary = %binary.display(), "Using headless browser");

        Ok(Self::new(
            binary,
            config.args.clone(),
            Duration::from_millis(config.navigation_timeout_ms),
        ))
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

fn find_browser() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("CHROME_PATH").map(PathBuf::from) {
        if path.is_file() {
            return Some(path);
        }
        tracing::warn!(path = %path.display(), "CHROME_PATH does not point to a file");
    }

    let search_path = std::env::var_os("PATH")?;
    std::env::split_paths(&search_path)
        .flat_map(|dir| BROWSER_NAMES.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

#[async_trait]
impl ResourceFactory for ChromeFactory {
    type Resource = ChromePage;

    async fn create(&self) -> Result<ChromePage, EngineError> {
        if !tokio::fs::try_exists(&self.binary).await? {
            return Err(EngineError::Launch(format!(
                "browser binary not found: {}",
                self.binary.display()
            )));
        }

        let workdir = tokio::task::spawn_blocking(|| {
            tempfile::Builder::new().prefix("pagepool-").tempdir()
        })
        .await
        .map_err(|e| EngineError::Launch(format!("workspace task failed: {e}")))??;

        tracing::debug!(workdir = %workdir.path().display(), "Created Chrome page");

        Ok(ChromePage {
            workdir,
            binary: self.binary.clone(),
            args: self.args.clone(),
            timeout: self.timeout,
            source: None,
            wait: WaitPolicy::default(),
            print_media: false,
        })
    }

    async fn destroy(&self, page: ChromePage) -> Result<(), EngineError> {
        tokio::task::spawn_blocking(move || page.workdir.close())
            .await
            .map_err(|e| EngineError::Io(std::io::Error::other(e)))??;
        Ok(())
    }

    async fn validate(&self, page: &mut ChromePage) -> bool {
        let workdir_ok = tokio::fs::metadata(page.workdir.path())
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        let binary_ok = tokio::fs::try_exists(&page.binary).await.unwrap_or(false);
        workdir_ok && binary_ok
    }
}

/// A pooled Chrome page: a working directory plus the staged document
pub struct ChromePage {
    workdir: TempDir,
    binary: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    source: Option<PageSource>,
    wait: WaitPolicy,
    print_media: bool,
}

impl ChromePage {
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    /// Write the staged document and return the target Chrome should open
    async fn stage(&self, options: &PdfOptions) -> Result<String, EngineError> {
        match &self.source {
            None => Err(EngineError::Render("no content loaded".to_string())),
            Some(PageSource::Address(url)) => Ok(url.to_string()),
            Some(PageSource::Markup(html)) => {
                let path = self.workdir.path().join(PAGE_FILE);
                tokio::fs::write(&path, with_page_rule(html, options.page_rule().as_deref()))
                    .await?;
                Url::from_file_path(&path)
                    .map(|url| url.to_string())
                    .map_err(|_| EngineError::Render(format!("bad page path: {}", path.display())))
            }
        }
    }

    fn print_args(&self, output: &Path) -> Vec<String> {
        let mut args = vec![
            "--headless".to_string(),
            "--disable-gpu".to_string(),
            "--no-pdf-header-footer".to_string(),
        ];
        if self.wait == WaitPolicy::NetworkIdle {
            args.push("--run-all-compositor-stages-before-draw".to_string());
        }
        args.extend(self.args.iter().cloned());
        args.push(format!("--print-to-pdf={}", output.display()));
        args
    }
}

#[async_trait]
impl RendererHandle for ChromePage {
    async fn load_markup(&mut self, html: &str, wait: WaitPolicy) -> Result<(), EngineError> {
        self.source = Some(PageSource::Markup(html.to_string()));
        self.wait = wait;
        self.print_media = false;
        Ok(())
    }

    async fn load_address(&mut self, url: &Url, wait: WaitPolicy) -> Result<(), EngineError> {
        match url.scheme() {
            "http" | "https" | "file" => {}
            other => {
                return Err(EngineError::Load(format!("unsupported URL scheme: {other}")));
            }
        }
        self.source = Some(PageSource::Address(url.clone()));
        self.wait = wait;
        self.print_media = false;
        Ok(())
    }

    async fn emulate_print_layout(&mut self) -> Result<(), EngineError> {
        if self.source.is_none() {
            return Err(EngineError::Load("no content loaded".to_string()));
        }
        // --print-to-pdf always lays out with print media.
        self.print_media = true;
        Ok(())
    }

    async fn render_buffer(&mut self, options: &PdfOptions) -> Result<Bytes, EngineError> {
        let target = self.stage(options).await?;
        let output = self.workdir.path().join(OUTPUT_FILE);
        let _ = tokio::fs::remove_file(&output).await;

        let mut command = Command::new(&self.binary);
        command
            .args(self.print_args(&output))
            .arg(&target)
            .kill_on_drop(true);

        tracing::debug!(
            target = %target,
            print_media = self.print_media,
            "Printing page with Chrome"
        );

        let result = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| EngineError::Timeout(self.timeout))?
            .map_err(|e| EngineError::Launch(format!("failed to run browser: {e}")))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(EngineError::Render(format!(
                "browser exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }

        let pdf = tokio::fs::read(&output).await.map_err(|e| {
            EngineError::Render(format!("browser produced no PDF: {e}"))
        })?;
        tokio::fs::remove_file(&output).await?;

        Ok(Bytes::from(pdf))
    }

    async fn render_stream(&mut self, options: &PdfOptions) -> Result<PdfByteStream, EngineError> {
        let pdf = self.render_buffer(options).await?;
        Ok(chunked(pdf, STREAM_CHUNK_SIZE))
    }
}

/// Split a buffer into a stream of chunks sharing the same allocation
fn chunked(pdf: Bytes, chunk_size: usize) -> PdfByteStream {
    let chunks: Vec<Result<Bytes, EngineError>> = (0..pdf.len())
        .step_by(chunk_size)
        .map(|start| Ok(pdf.slice(start..(start + chunk_size).min(pdf.len()))))
        .collect();
    Box::pin(futures_util::stream::iter(chunks))
}

/// Inject an `@page` rule into markup: inside `<head>` when there is one,
/// otherwise after the doctype so the page stays in standards mode
fn with_page_rule(html: &str, rule: Option<&str>) -> String {
    let Some(rule) = rule else {
        return html.to_string();
    };
    let style = format!("<style>{rule}</style>");

    let insert_at = head_tag_end(html).or_else(|| doctype_end(html)).unwrap_or(0);
    format!("{}{}{}", &html[..insert_at], style, &html[insert_at..])
}

/// Byte offset just past the opening `<head ...>` tag, matched case-insensitively
fn head_tag_end(html: &str) -> Option<usize> {
    let lower = html.to_ascii_lowercase();
    let mut from = 0;
    while let Some(pos) = lower[from..].find("<head") {
        let start = from + pos;
        let after = start + "<head".len();
        match lower.as_bytes().get(after) {
            Some(b'>') => return Some(after + 1),
            Some(c) if c.is_ascii_whitespace() || *c == b'/' => {
                return lower[after..].find('>').map(|end| after + end + 1);
            }
            // `<header>` and friends
            _ => from = after,
        }
    }
    None
}

fn doctype_end(html: &str) -> Option<usize> {
    let trimmed = html.trim_start();
    let offset = html.len() - trimmed.len();
    if !trimmed.to_ascii_lowercase().starts_with("<!doctype") {
        return None;
    }
    trimmed.find('>').map(|end| offset + end + 1)
}
