use bytes::Bytes;

use crate::error::{EngineError, GenerateError, PoolError};
use crate::models::{DocumentInput, PdfOptions};
use crate::rendering::{RendererHandle, WaitPolicy};
use crate::services::pdf_stream::PdfStream;
use crate::services::pool::{Pool, PoolConfig, PoolStats, Pooled, ResourceFactory};

/// Result of [`PdfGenerator::generate`]
pub enum PdfOutput<F: ResourceFactory> {
    Buffer(Bytes),
    Stream(PdfStream<F>),
}

/// Converts documents to PDF on pooled renderers.
///
/// Failure policy per stage:
/// - content load fails: the renderer goes back to the pool, it is presumed healthy
/// - rendering fails: the renderer is destroyed
/// - an open stream errors: the renderer is destroyed, the error surfaces on the stream
pub struct PdfGenerator<F: ResourceFactory> {
    pool: Pool<F>,
    default_options: PdfOptions,
}

impl<F> PdfGenerator<F>
where
    F: ResourceFactory,
    F::Resource: RendererHandle,
{
    /// Create a generator with its own renderer pool.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(factory: F, config: PoolConfig) -> Result<Self, PoolError> {
        Ok(Self {
            pool: Pool::new(factory, config)?,
            default_options: PdfOptions::print_defaults(),
        })
    }

    /// Replace the options used for requests that carry none
    pub fn with_default_options(mut self, options: PdfOptions) -> Self {
        self.default_options = options;
        self
    }

    /// Wait until the pool has provisioned its minimum renderers
    pub async fn await_ready(&self) -> Result<(), PoolError> {
        self.pool.ready().await
    }

    /// Render to a buffer, or to a stream when `as_stream` is set
    pub async fn generate(
        &self,
        input: impl Into<DocumentInput>,
        as_stream: bool,
        options: Option<PdfOptions>,
    ) -> Result<PdfOutput<F>, GenerateError> {
        if as_stream {
            self.render_stream(input, options)
                .await
                .map(PdfOutput::Stream)
        } else {
            self.render_buffer(input, options)
                .await
                .map(PdfOutput::Buffer)
        }
    }

    pub async fn render_buffer(
        &self,
        input: impl Into<DocumentInput>,
        options: Option<PdfOptions>,
    ) -> Result<Bytes, GenerateError> {
        let input = input.into();
        let options = options.unwrap_or_else(|| self.default_options.clone());
        let mut page = self.prepare(&input).await?;

        match page.render_buffer(&options).await {
            Ok(pdf) => {
                tracing::debug!(id = page.id(), bytes = pdf.len(), "PDF rendered");
                page.release().await;
                Ok(pdf)
            }
            Err(e) => {
                tracing::warn!(id = page.id(), error = %e, "PDF render failed, destroying renderer");
                page.destroy().await;
                Err(GenerateError::Render(e))
            }
        }
    }

    /// Open a PDF stream. The renderer stays checked out until the stream
    /// ends, errors or is dropped.
    pub async fn render_stream(
        &self,
        input: impl Into<DocumentInput>,
        options: Option<PdfOptions>,
    ) -> Result<PdfStream<F>, GenerateError> {
        let input = input.into();
        let options = options.unwrap_or_else(|| self.default_options.clone());
        let mut page = self.prepare(&input).await?;

        match page.render_stream(&options).await {
            Ok(stream) => {
                tracing::debug!(id = page.id(), "PDF stream opened");
                Ok(PdfStream::new(stream, page))
            }
            Err(e) => {
                tracing::warn!(id = page.id(), error = %e, "PDF stream failed to open, destroying renderer");
                page.destroy().await;
                Err(GenerateError::Render(e))
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Drain the pool: wait for outstanding renders, then dispose of every renderer
    pub async fn shutdown(&self) {
        self.pool.drain().await;
    }

    async fn prepare(&self, input: &DocumentInput) -> Result<Pooled<F>, GenerateError> {
        let mut page = self.pool.acquire().await?;
        tracing::debug!(id = page.id(), input = %input.describe(), "Loading content");

        if let Err(e) = load_content(&mut *page, input).await {
            tracing::warn!(id = page.id(), error = %e, "Content load failed, returning renderer");
            page.release().await;
            return Err(GenerateError::ContentLoad(e));
        }

        Ok(page)
    }
}

async fn load_content<H: RendererHandle>(
    page: &mut H,
    input: &DocumentInput,
) -> Result<(), EngineError> {
    match input {
        DocumentInput::Address(url) => page.load_address(url, WaitPolicy::NetworkIdle).await?,
        DocumentInput::Markup(html) => page.load_markup(html, WaitPolicy::NetworkIdle).await?,
    }
    page.emulate_print_layout().await
}
