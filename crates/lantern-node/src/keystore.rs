//! Station identity persistence
//!
//! The station id is the public half of the transport key, so keeping the
//! same nickname across restarts means keeping the same secret key on disk.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use iroh::SecretKey;
use tracing::{debug, info};

/// Filename for the station's secret key
const KEY_FILENAME: &str = "station.key";

fn key_path(data_dir: &Path) -> PathBuf {
    data_dir.join(KEY_FILENAME)
}

/// Load the station key from the data directory, generating and saving a
/// fresh one on first run
pub fn load_or_generate(data_dir: &Path) -> anyhow::Result<SecretKey> {
    let path = key_path(data_dir);
    if path.exists() {
        return load(&path);
    }

    info!("No station identity on disk, generating a new key");
    let key = SecretKey::generate(&mut rand::rng());
    save(data_dir, &key)?;
    Ok(key)
}

fn load(path: &Path) -> anyhow::Result<SecretKey> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read key file {}", path.display()))?;
    if bytes.len() != 32 {
        bail!(
            "invalid key file {}: expected 32 bytes, got {}",
            path.display(),
            bytes.len()
        );
    }

    let mut key_bytes = [0u8; 32];
    key_bytes.copy_from_slice(&bytes);
    let key = SecretKey::from_bytes(&key_bytes);
    debug!(station = %key.public().fmt_short(), "Loaded station identity");
    Ok(key)
}

fn save(data_dir: &Path, key: &SecretKey) -> anyhow::Result<()> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;

    let path = key_path(data_dir);
    std::fs::write(&path, key.to_bytes())
        .with_context(|| format!("failed to write key file {}", path.display()))?;
    set_restrictive_permissions(&path)?;

    info!(station = %key.public().fmt_short(), path = %path.display(), "Saved station identity");
    Ok(())
}

/// The key is a credential; keep it owner-readable only (Unix)
fn set_restrictive_permissions(path: &Path) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }
    let _ = path;
    Ok(())
}
