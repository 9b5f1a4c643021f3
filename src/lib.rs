//! Pagepool - pooled HTML/URL to PDF rendering.
//!
//! A bounded pool of headless renderer instances behind a PDF pipeline that
//! produces either a complete buffer or a stream, plus the HTTP service that
//! exposes it. This library exposes modules for integration testing.

pub mod api;
pub mod error;
pub mod models;
pub mod rendering;
pub mod server;
pub mod services;
