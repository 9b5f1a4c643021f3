pub mod pdf;
pub mod pool;

pub use pdf::{handle_pdf, PdfRequest, __path_handle_pdf};
pub use pool::{handle_pool_stats, PoolStatsResponse, __path_handle_pool_stats};
