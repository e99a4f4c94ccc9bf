use std::path::Path;

use crate::common::errors::TrashError;

/// Recoverable deletion. Implementations move a path somewhere the user
/// can restore it from.
pub trait TrashFacility {
    /// Called once before a purge sweep. An `Unavailable` error aborts
    /// the purge phase without touching anything.
    fn ensure_available(&self) -> Result<(), TrashError> {
        Ok(())
    }

    fn send_to_trash(&self, path: &Path) -> Result<(), TrashError>;
}

/// The platform trash (Recycle Bin, macOS Trash, freedesktop trash)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTrash;

impl TrashFacility for SystemTrash {
    fn ensure_available(&self) -> Result<(), TrashError> {
        // The freedesktop home trash lives under the user data dir
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            let data_dir = dirs::data_local_dir().ok_or_else(|| TrashError::Unavailable {
                reason: "no user data directory (is $HOME set?)".into(),
            })?;
            std::fs::create_dir_all(&data_dir).map_err(|e| TrashError::Unavailable {
                reason: format!("cannot create '{}': {}", data_dir.display(), e),
            })?;
        }
        Ok(())
    }

    fn send_to_trash(&self, path: &Path) -> Result<(), TrashError> {
        trash::delete(path).map_err(|e| {
            if std::fs::symlink_metadata(path).is_err() {
                TrashError::Missing {
                    path: path.to_path_buf(),
                }
            } else {
                TrashError::Failed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
            }
        })
    }
}
