//! Execution provider parsing and availability reporting

use crate::{
    config::ExecutionProvider,
    error::{BgRemovalError, Result},
};
use serde::Serialize;

/// Information about an execution provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub execution_provider: ExecutionProvider,
    pub available: bool,
    pub description: String,
}

/// Utility for parsing and listing execution providers
pub struct ExecutionProviderManager;

impl ExecutionProviderManager {
    /// Parse a provider name, accepting an optional `onnx:` prefix
    ///
    /// # Examples
    /// ```rust
    /// use bgremove_web::utils::ExecutionProviderManager;
    /// use bgremove_web::ExecutionProvider;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// assert_eq!(
    ///     ExecutionProviderManager::parse_provider_string("onnx:cuda")?,
    ///     ExecutionProvider::Cuda
    /// );
    /// assert_eq!(
    ///     ExecutionProviderManager::parse_provider_string("cpu")?,
    ///     ExecutionProvider::Cpu
    /// );
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// - Unknown backend prefix or provider name
    pub fn parse_provider_string(provider_str: &str) -> Result<ExecutionProvider> {
        let provider = match provider_str.split_once(':') {
            Some(("onnx", provider)) => provider,
            Some((backend, _)) => {
                return Err(BgRemovalError::invalid_config(format!(
                    "Unknown backend: {}. Supported backends: onnx",
                    backend
                )));
            },
            None if provider_str == "onnx" => "auto",
            None => provider_str,
        };

        provider.parse()
    }

    /// Whether `provider_str` names a known provider
    #[must_use]
    pub fn is_valid_provider_string(provider_str: &str) -> bool {
        Self::parse_provider_string(provider_str).is_ok()
    }

    /// List every provider with its availability on this machine
    #[must_use]
    pub fn list_all_providers() -> Vec<ProviderInfo> {
        let mut providers = Vec::new();

        #[cfg(feature = "onnx")]
        {
            use crate::backends::OnnxBackend;

            let availability: std::collections::HashMap<String, bool> =
                OnnxBackend::list_providers()
                    .into_iter()
                    .map(|(name, available, _)| (name.to_lowercase(), available))
                    .collect();
            let available = |name: &str| availability.get(name).copied().unwrap_or(false);

            providers.push(ProviderInfo {
                name: "onnx:auto".to_string(),
                execution_provider: ExecutionProvider::Auto,
                available: availability.values().any(|&a| a),
                description: "ONNX Runtime with auto-selected provider".to_string(),
            });
            providers.push(ProviderInfo {
                name: "onnx:cpu".to_string(),
                execution_provider: ExecutionProvider::Cpu,
                available: available("cpu"),
                description: "ONNX Runtime CPU execution".to_string(),
            });
            providers.push(ProviderInfo {
                name: "onnx:cuda".to_string(),
                execution_provider: ExecutionProvider::Cuda,
                available: available("cuda"),
                description: "ONNX Runtime CUDA GPU acceleration".to_string(),
            });
            providers.push(ProviderInfo {
                name: "onnx:coreml".to_string(),
                execution_provider: ExecutionProvider::CoreMl,
                available: available("coreml"),
                description: "ONNX Runtime CoreML (Apple Silicon) acceleration".to_string(),
            });
        }

        #[cfg(not(feature = "onnx"))]
        {
            for (name, execution_provider) in [
                ("onnx:auto", ExecutionProvider::Auto),
                ("onnx:cpu", ExecutionProvider::Cpu),
                ("onnx:cuda", ExecutionProvider::Cuda),
                ("onnx:coreml", ExecutionProvider::CoreMl),
            ] {
                providers.push(ProviderInfo {
                    name: name.to_string(),
                    execution_provider,
                    available: false,
                    description: "ONNX Runtime (feature disabled)".to_string(),
                });
            }
        }

        providers
    }
}
