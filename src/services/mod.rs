pub mod pdf_generator;
pub mod pdf_stream;
pub mod pool;

pub use pdf_generator::{PdfGenerator, PdfOutput};
pub use pdf_stream::{PdfStream, TerminalEvent};
pub use pool::{Pool, PoolConfig, PoolStats, Pooled, ResourceFactory};
