use crate::engine::Engine;
use crate::error::{Error, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Mode for every directory the instance creates.
pub const OWNER_ONLY: u32 = 0o700;

/// On-disk layout of one instance, derived from the base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub base_dir: PathBuf,
    pub data_dir: PathBuf,
    pub socket_dir: PathBuf,
    pub log_path: PathBuf,
    subdirectories: Vec<PathBuf>,
}

impl Layout {
    pub fn new<E: Engine + ?Sized>(engine: &E, base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            data_dir: engine.data_directory(base_dir),
            socket_dir: engine.socket_directory(base_dir),
            log_path: engine.log_file(base_dir),
            subdirectories: engine
                .subdirectories()
                .iter()
                .map(|name| base_dir.join(name))
                .collect(),
        }
    }

    /// Create missing subdirectories with mode 0700. Existing ones are left alone.
    pub fn create_subdirectories(&self) -> Result<()> {
        for dir in &self.subdirectories {
            if dir.exists() {
                continue;
            }
            fs::create_dir_all(dir).map_err(|e| {
                Error::Filesystem(format!("Failed to create {}: {}", dir.display(), e))
            })?;
            set_owner_only(dir)?;
        }
        Ok(())
    }

    pub fn subdirectories(&self) -> &[PathBuf] {
        &self.subdirectories
    }
}

pub fn set_owner_only(path: &Path) -> Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(OWNER_ONLY)).map_err(|e| {
        Error::Filesystem(format!(
            "Failed to set permissions on {}: {}",
            path.display(),
            e
        ))
    })
}

/// Recursive copy of `src` into `dst`, which must not exist yet.
///
/// Symlinks are recreated, not followed. File permissions are carried over
/// by `fs::copy`.
pub fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target = dst.join(entry.file_name());

        if file_type.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else if file_type.is_symlink() {
            std::os::unix::fs::symlink(fs::read_link(entry.path())?, &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Clone `src` into `layout.data_dir` on a blocking thread.
///
/// Fails if the data directory already exists.
pub async fn clone_data_dir(src: &Path, layout: &Layout) -> Result<()> {
    let src = src.to_path_buf();
    let base = layout.base_dir.clone();
    let dst = layout.data_dir.clone();

    tokio::task::spawn_blocking(move || -> Result<()> {
        if !src.is_dir() {
            return Err(Error::Provisioning(format!(
                "copy_data_from {} is not a directory",
                src.display()
            )));
        }
        if dst.exists() {
            return Err(Error::Provisioning(format!(
                "Cannot copy {}: {} already exists",
                src.display(),
                dst.display()
            )));
        }
        // A base directory supplied by the caller keeps its mode.
        let created_base = !base.exists();
        fs::create_dir_all(&base)?;
        if created_base {
            set_owner_only(&base)?;
        }
        copy_tree(&src, &dst).map_err(|e| {
            Error::Provisioning(format!(
                "Failed to copy {} to {}: {}",
                src.display(),
                dst.display(),
                e
            ))
        })?;
        set_owner_only(&dst)
    })
    .await
    .map_err(|e| Error::Provisioning(format!("Copy task failed: {}", e)))?
}
