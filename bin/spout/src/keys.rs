use anyhow::{Context, Result};
use spout_client::keystore::{generate_signing_key, signing_key_from_hex, signing_key_to_hex, SigningKey};
use spout_client::ClientConfig;
use std::fs;
use std::path::Path;
use tracing::info;

pub fn load_or_generate_key<P: AsRef<Path>>(path: P) -> Result<SigningKey> {
    if path.as_ref().exists() {
        info!("Loading signing key from {:?}", path.as_ref());
        let contents = fs::read_to_string(path.as_ref())?;
        Ok(signing_key_from_hex(&contents)?)
    } else {
        info!("Generating new signing key");
        let key = generate_signing_key();
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path.as_ref(), signing_key_to_hex(&key))?;
        Ok(key)
    }
}

/// The configured key: inline `private_key` first, then `key_file` if it
/// exists. No key means the identity provider is absent.
pub fn load_signing_key(config: &ClientConfig) -> Result<Option<SigningKey>> {
    if let Some(key) = &config.private_key {
        return Ok(Some(signing_key_from_hex(key).context("Invalid private_key")?));
    }
    match &config.key_file {
        Some(path) if Path::new(path).exists() => {
            let contents = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
            Ok(Some(signing_key_from_hex(&contents).with_context(|| format!("Invalid key in {}", path))?))
        }
        _ => Ok(None),
    }
}
