// Refresh-token persistence for the host
// The token manager only reports rotations; the bridge stores them here

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::types::RotationCallback;

/// Load a previously rotated refresh token
///
/// Returns `None` when the file is missing or blank.
pub fn load_refresh_token(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read token file: {}", path.display()))?;
    let token = content.trim();

    if token.is_empty() {
        Ok(None)
    } else {
        Ok(Some(token.to_string()))
    }
}

/// Store a rotated refresh token (write to a sibling temp file, then rename)
pub fn save_refresh_token(path: &Path, token: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, format!("{}\n", token))
        .with_context(|| format!("Failed to write token file: {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace token file: {}", path.display()))?;

    tracing::debug!("Stored rotated refresh token in {}", path.display());
    Ok(())
}

/// Rotation callback that stores every rotated refresh token in `path`
///
/// The write runs on the blocking pool so the token acquisition lock is not
/// held across file I/O. Writes are serialized so the temp file is never
/// shared by two writers.
pub fn persist_rotations(path: PathBuf) -> RotationCallback {
    let write_lock = Arc::new(Mutex::new(()));

    Arc::new(move |new_refresh_token: &str| {
        let path = path.clone();
        let token = new_refresh_token.to_string();
        let write_lock = write_lock.clone();

        tokio::task::spawn_blocking(move || {
            let _guard = write_lock.lock().unwrap_or_else(|e| e.into_inner());
            match save_refresh_token(&path, &token) {
                Ok(()) => tracing::info!("Rotated refresh token saved to {}", path.display()),
                Err(e) => tracing::error!("Failed to persist rotated refresh token: {:#}", e),
            }
        });
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refresh_token");
        assert_eq!(load_refresh_token(&path).unwrap(), None);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("refresh_token");

        save_refresh_token(&path, "5bff|rotated").unwrap();
        assert_eq!(
            load_refresh_token(&path).unwrap().as_deref(),
            Some("5bff|rotated")
        );

        save_refresh_token(&path, "5bff|rotated-again").unwrap();
        assert_eq!(
            load_refresh_token(&path).unwrap().as_deref(),
            Some("5bff|rotated-again")
        );
    }

    #[test]
    fn test_blank_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refresh_token");
        std::fs::write(&path, "  \n").unwrap();
        assert_eq!(load_refresh_token(&path).unwrap(), None);
    }

    #[tokio::test]
    async fn test_persist_rotations_writes_off_the_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refresh_token");

        let callback = persist_rotations(path.clone());
        callback("5bff|rotated");

        let mut stored = None;
        for _ in 0..50 {
            stored = load_refresh_token(&path).unwrap();
            if stored.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(stored.as_deref(), Some("5bff|rotated"));
    }
}
