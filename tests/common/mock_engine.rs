//! In-process renderer engine with switchable failures.
//!
//! `MockFactory` and every `MockPage` it creates share one `MockControls`,
//! so a test can flip a failure on and watch the pool react through the
//! counters.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use pagepool::error::EngineError;
use pagepool::models::PdfOptions;
use pagepool::rendering::{PdfByteStream, RendererHandle, WaitPolicy};
use pagepool::services::ResourceFactory;

/// Document every mock render produces
pub const MOCK_PDF: &[u8] = b"%PDF-1.7\n1 0 obj << /Type /Catalog >> endobj\n%%EOF\n";

/// Stream chunk size, small enough to give several chunks per document
pub const CHUNK_SIZE: usize = 8;

#[derive(Default)]
pub struct MockControls {
    pub created: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub validated: AtomicUsize,
    pub renders: AtomicUsize,

    pub fail_create: AtomicBool,
    pub fail_load: AtomicBool,
    pub fail_render: AtomicBool,
    pub fail_stream_open: AtomicBool,
    pub fail_stream_midway: AtomicBool,
    /// Number of upcoming health checks that report unhealthy
    pub failing_validations: AtomicUsize,

    pub create_delay_ms: AtomicU64,
    pub render_delay_ms: AtomicU64,
    pub validate_delay_ms: AtomicU64,
    pub chunk_delay_ms: AtomicU64,

    pub last_options: Mutex<Option<PdfOptions>>,
}

impl MockControls {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn validated(&self) -> usize {
        self.validated.load(Ordering::SeqCst)
    }

    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    pub fn set(&self, flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }

    pub fn fail_next_validations(&self, count: usize) {
        self.failing_validations.store(count, Ordering::SeqCst);
    }

    pub fn last_options(&self) -> Option<PdfOptions> {
        self.last_options
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[derive(Clone, Default)]
pub struct MockFactory {
    pub controls: Arc<MockControls>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResourceFactory for MockFactory {
    type Resource = MockPage;

    async fn create(&self) -> Result<MockPage, EngineError> {
        let delay = self.controls.create_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.controls.fail_create.load(Ordering::SeqCst) {
            return Err(EngineError::Launch("mock browser refused to start".to_string()));
        }

        let id = self.controls.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MockPage {
            id,
            controls: self.controls.clone(),
            loaded: None,
        })
    }

    async fn destroy(&self, _page: MockPage) -> Result<(), EngineError> {
        self.controls.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn validate(&self, _page: &mut MockPage) -> bool {
        self.controls.validated.fetch_add(1, Ordering::SeqCst);
        let delay = self.controls.validate_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let failing = self.controls.failing_validations.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |n| n.checked_sub(1),
        );
        failing.is_err()
    }
}

pub struct MockPage {
    pub id: usize,
    controls: Arc<MockControls>,
    loaded: Option<String>,
}

impl MockPage {
    fn check_loaded(&self) -> Result<(), EngineError> {
        match self.loaded {
            Some(_) => Ok(()),
            None => Err(EngineError::Render("nothing loaded".to_string())),
        }
    }

    fn record(&self, options: &PdfOptions) {
        self.controls.renders.fetch_add(1, Ordering::SeqCst);
        *self
            .controls
            .last_options
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(options.clone());
    }
}

#[async_trait]
impl RendererHandle for MockPage {
    async fn load_markup(&mut self, html: &str, _wait: WaitPolicy) -> Result<(), EngineError> {
        if self.controls.fail_load.load(Ordering::SeqCst) {
            return Err(EngineError::Load("mock markup failed to load".to_string()));
        }
        self.loaded = Some(html.to_string());
        Ok(())
    }

    async fn load_address(&mut self, url: &Url, _wait: WaitPolicy) -> Result<(), EngineError> {
        if self.controls.fail_load.load(Ordering::SeqCst) {
            return Err(EngineError::Load(format!("mock navigation to {url} failed")));
        }
        self.loaded = Some(url.to_string());
        Ok(())
    }

    async fn emulate_print_layout(&mut self) -> Result<(), EngineError> {
        self.check_loaded()
    }

    async fn render_buffer(&mut self, options: &PdfOptions) -> Result<Bytes, EngineError> {
        self.check_loaded()?;
        let delay = self.controls.render_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.controls.fail_render.load(Ordering::SeqCst) {
            return Err(EngineError::Render("mock print failed".to_string()));
        }
        self.record(options);
        Ok(Bytes::from_static(MOCK_PDF))
    }

    async fn render_stream(&mut self, options: &PdfOptions) -> Result<PdfByteStream, EngineError> {
        self.check_loaded()?;
        if self.controls.fail_stream_open.load(Ordering::SeqCst) {
            return Err(EngineError::Stream("mock stream refused to open".to_string()));
        }
        self.record(options);

        let delay = Duration::from_millis(self.controls.chunk_delay_ms.load(Ordering::SeqCst));
        let fail_midway = self.controls.fail_stream_midway.load(Ordering::SeqCst);

        let mut items: Vec<Result<Bytes, EngineError>> = MOCK_PDF
            .chunks(CHUNK_SIZE)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        if fail_midway {
            items.truncate(1);
            items.push(Err(EngineError::Stream("mock stream broke".to_string())));
            items.push(Ok(Bytes::from_static(b"never delivered")));
        }

        Ok(stream::iter(items)
            .then(move |item| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                item
            })
            .boxed())
    }
}
