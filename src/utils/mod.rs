//! Shared helpers for tensor preparation and execution provider discovery

pub mod preprocessing;
pub mod providers;

pub use preprocessing::ImagePreprocessor;
pub use providers::{ExecutionProviderManager, ProviderInfo};
