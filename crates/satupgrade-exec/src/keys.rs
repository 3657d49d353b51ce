//! SSH private key resolution

use std::env;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Where the controller's SSH private key comes from
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Key file on disk
    Path(PathBuf),
    /// Base64-encoded key held in an environment variable (CI runners)
    Env(String),
}

impl KeySource {
    /// Resolve to a key file usable by the SSH client.
    ///
    /// `Env` keys are decoded into a private temp file removed on drop.
    ///
    /// # Errors
    /// Returns `KeyError` if the file is missing or too open, or the variable is unset or not base64
    pub fn resolve(&self) -> Result<ResolvedKey, KeyError> {
        match self {
            KeySource::Path(path) => {
                check_permissions(path)?;
                Ok(ResolvedKey::Path(path.clone()))
            }
            KeySource::Env(var_name) => {
                let encoded =
                    env::var(var_name).map_err(|_| KeyError::EnvNotSet(var_name.clone()))?;
                let key_data = decode(&encoded).map_err(|_| KeyError::InvalidBase64)?;
                Ok(ResolvedKey::Temp(write_temp_key(&key_data)?))
            }
        }
    }
}

impl Default for KeySource {
    /// `~/.ssh/id_rsa`, the key the upgrade hosts are provisioned with
    fn default() -> Self {
        let home = env::var_os("HOME").map_or_else(|| PathBuf::from("/root"), PathBuf::from);
        KeySource::Path(home.join(".ssh").join("id_rsa"))
    }
}

/// Key file ready to load
#[derive(Debug)]
pub enum ResolvedKey {
    /// User-provided key file
    Path(PathBuf),
    /// Decoded key, deleted on drop
    Temp(PathBuf),
}

impl ResolvedKey {
    /// Path to hand to the SSH library
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ResolvedKey::Path(p) | ResolvedKey::Temp(p) => p,
        }
    }
}

/// Key resolution errors
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("environment variable {0} not set")]
    EnvNotSet(String),

    #[error("invalid base64 encoding")]
    InvalidBase64,

    #[error("key file permissions too open: {0} (should be 600)")]
    BadPermissions(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn decode(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(input.trim())
}

fn check_permissions(path: &Path) -> Result<(), KeyError> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)?.permissions().mode();

    // group/other bits must be clear
    if mode & 0o77 != 0 {
        return Err(KeyError::BadPermissions(path.display().to_string()));
    }

    Ok(())
}

fn write_temp_key(key_data: &[u8]) -> Result<PathBuf, KeyError> {
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let temp_path =
        env::temp_dir().join(format!("satupgrade_ssh_key_{}", std::process::id()));

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(&temp_path)?;
    file.write_all(key_data)?;

    debug!(path = %temp_path.display(), "wrote temporary SSH key");

    Ok(temp_path)
}

impl Drop for ResolvedKey {
    fn drop(&mut self) {
        if let ResolvedKey::Temp(path) = self {
            if let Err(e) = std::fs::remove_file(&*path) {
                warn!(path = %path.display(), error = %e, "failed to remove temp key");
            }
        }
    }
}
