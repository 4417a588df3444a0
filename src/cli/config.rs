//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::{
    config::{RemovalConfig, ServerConfig},
    utils::ExecutionProviderManager,
};
use anyhow::{Context, Result};

/// Convert CLI arguments to `ServerConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    pub(crate) fn from_cli(cli: &Cli) -> Result<ServerConfig> {
        let execution_provider = ExecutionProviderManager::parse_provider_string(&cli.execution_provider)
            .context("Invalid execution provider format")?;

        let mut removal = RemovalConfig::builder()
            .execution_provider(execution_provider)
            .num_threads(cli.threads)
            .disable_cache(cli.no_session_cache)
            .alpha_matting(!cli.no_alpha_matting);
        if let Some(model_dir) = &cli.model_dir {
            removal = removal.model_dir(model_dir);
        }
        let removal = removal.build().context("Invalid removal configuration")?;

        ServerConfig::builder()
            .host(cli.host.clone())
            .port(cli.port)
            .static_dir(&cli.static_dir)
            .auto_download(!cli.no_download)
            .removal(removal)
            .build()
            .context("Invalid server configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionProvider;
    use clap::Parser;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["bgremove-web"]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 5000);
        assert!(config.auto_download);
        assert!(config.removal.alpha_matting);
        assert!(!config.removal.disable_cache);
        assert_eq!(config.removal.execution_provider, ExecutionProvider::Auto);
    }

    #[test]
    fn test_flags_map_to_config() {
        let cli = Cli::parse_from([
            "bgremove-web",
            "--host",
            "0.0.0.0",
            "--port",
            "8080",
            "--execution-provider",
            "onnx:cpu",
            "--threads",
            "4",
            "--no-session-cache",
            "--no-download",
            "--no-alpha-matting",
            "--model-dir",
            "/tmp/models",
        ]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(config.port, 8080);
        assert!(!config.auto_download);
        assert!(config.removal.disable_cache);
        assert!(!config.removal.alpha_matting);
        assert_eq!(config.removal.intra_threads, 4);
        assert_eq!(config.removal.execution_provider, ExecutionProvider::Cpu);
        assert_eq!(config.removal.model_dir.as_deref(), Some(std::path::Path::new("/tmp/models")));
    }

    #[test]
    fn test_invalid_host_is_rejected() {
        let cli = Cli::parse_from(["bgremove-web", "--host", "not an address"]);
        assert!(CliConfigBuilder::from_cli(&cli).is_err());
    }
}
