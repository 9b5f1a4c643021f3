pub mod config;
pub mod pdf_options;

pub use config::{AppConfig, ChromeConfig};
pub use pdf_options::{DocumentInput, Margins, PageFormat, PdfOptions};
