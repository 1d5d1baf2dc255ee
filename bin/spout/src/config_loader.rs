use crate::cli::Cli;
use anyhow::Result;
use spout_client::ClientConfig;
use spout_common::utils::config::load_config_or_default;
use std::path::Path;

/// File (if present), then `SPOUT_*` variables, then command-line flags.
pub fn load_client_config<P: AsRef<Path>>(path: P, cli: &Cli) -> Result<ClientConfig> {
    let mut config: ClientConfig = load_config_or_default(path)?;
    config.apply_env();

    if let Some(url) = &cli.rpc_url {
        config.rpc_url = url.clone();
    }
    if let Some(faucet) = &cli.faucet {
        config.faucet_address = faucet.clone();
    }
    if let Some(key) = &cli.private_key {
        config.private_key = Some(key.clone());
    }
    if let Some(dd) = &cli.data_dir {
        config.db_path = dd.join("session").to_string_lossy().to_string();
        if config.key_file.is_none() {
            config.key_file = Some(dd.join("spout.key").to_string_lossy().to_string());
        }
    }
    if cli.debug {
        config.logging.level = "debug".to_string();
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_flags_override_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "rpc_url = \"http://file:8545\"\npoll_interval_secs = 30").unwrap();

        let cli = Cli::parse_from(["spout", "--rpc-url", "http://flag:8545", "--debug", "status"]);
        let config = load_client_config(file.path(), &cli).unwrap();
        assert_eq!(config.rpc_url, "http://flag:8545");
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let cli = Cli::parse_from(["spout", "--data-dir", "/tmp/spout-test"]);
        let config = load_client_config("/nonexistent/spout.toml", &cli).unwrap();
        assert_eq!(config.db_path, "/tmp/spout-test/session");
        assert_eq!(config.key_file.as_deref(), Some("/tmp/spout-test/spout.key"));
    }
}
