pub mod adapters;
pub mod cost;
pub mod pipeline;
pub mod types;

pub use cost::{CostEstimate, CostEstimateRequest};
pub use pipeline::Analyzer;
pub use types::*;
