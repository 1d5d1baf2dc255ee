use anyhow::{Context, Result};
use ::config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Prefix for environment overrides, e.g. `SPOUT__RPC_URL`.
pub const ENV_PREFIX: &str = "SPOUT";

/// Loads configuration from a file into a struct.
/// Supports TOML, YAML, JSON, etc. based on file extension. Values from
/// `SPOUT__*` environment variables take precedence over the file.
pub fn load_config<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let path_str = path.as_ref().to_str().context("Invalid config path")?;

    let settings = Config::builder()
        .add_source(File::with_name(path_str))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
        .with_context(|| format!("Failed to build configuration from {}", path_str))?;

    settings
        .try_deserialize::<T>()
        .context("Failed to deserialize configuration")
}

/// Same as [`load_config`] but falls back to `T::default()` when the file is absent.
pub fn load_config_or_default<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned + Default,
    P: AsRef<Path>,
{
    if path.as_ref().exists() {
        load_config(path)
    } else {
        Ok(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Sample {
        rpc_url: String,
        #[serde(default)]
        poll_interval_secs: u64,
    }

    #[test]
    fn test_load_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "rpc_url = \"http://localhost:8545\"\npoll_interval_secs = 15").unwrap();

        let loaded: Sample = load_config(file.path()).unwrap();
        assert_eq!(loaded.rpc_url, "http://localhost:8545");
        assert_eq!(loaded.poll_interval_secs, 15);
    }

    #[test]
    fn test_missing_file_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Sample = load_config_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, Sample::default());
    }
}
