//! Renderer engine interface consumed by the PDF pipeline.
//!
//! A pooled handle is owned by exactly one request at a time, so every
//! operation takes `&mut self`.

pub mod chrome;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use url::Url;

use crate::error::EngineError;
use crate::models::PdfOptions;

pub use chrome::{ChromeFactory, ChromePage};

/// Rendered document delivered in chunks. An `Err` item ends the stream.
pub type PdfByteStream = BoxStream<'static, Result<Bytes, EngineError>>;

/// When a content load counts as finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitPolicy {
    /// The load event fired
    Load,
    /// No network activity remains
    #[default]
    NetworkIdle,
}

#[async_trait]
pub trait RendererHandle: Send + 'static {
    async fn load_markup(&mut self, html: &str, wait: WaitPolicy) -> Result<(), EngineError>;

    async fn load_address(&mut self, url: &Url, wait: WaitPolicy) -> Result<(), EngineError>;

    /// Lay the page out for print media so screen-only styling stays out of the output.
    async fn emulate_print_layout(&mut self) -> Result<(), EngineError>;

    async fn render_buffer(&mut self, options: &PdfOptions) -> Result<Bytes, EngineError>;

    async fn render_stream(&mut self, options: &PdfOptions) -> Result<PdfByteStream, EngineError>;
}
