pub mod analysis;
pub mod config;
pub mod image;
pub mod models;
pub mod utils;
pub mod web;

// 重新导出主要类型
pub use analysis::{Analyzer, CompleteAnalysis};
pub use config::Config;
pub use models::ModelRegistry;
pub use utils::error::ServiceError;

pub type Result<T> = std::result::Result<T, ServiceError>;
