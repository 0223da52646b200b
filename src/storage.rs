//! Crash-safe file persistence for vault files, backups and key records.

use anyhow::{Context, Result};
use getrandom::fill;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A single file on disk, always replaced whole.
#[derive(Debug, Clone)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).with_context(|| format!("failed to read {}", self.path.display()))
    }

    /// Replaces the file contents atomically.
    ///
    /// Data goes to a fresh temp file next to the target, is fsynced, then
    /// renamed over the target; the parent directory is fsynced afterwards.
    /// A crash leaves either the old or the new contents, never a mix.
    /// On Unix the file is created readable by the owner only.
    pub fn save(&self, data: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let tmp_path = self.random_tmp_path()?;

        let mut tmp_file = owner_only(OpenOptions::new().write(true).create_new(true))
            .open(&tmp_path)
            .context("failed to create temporary file")?;

        tmp_file.write_all(data)?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        if let Err(e) = self.atomic_replace(&tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            File::open(parent)?.sync_all()?;
        }

        debug!(path = %self.path.display(), bytes = data.len(), "file written");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<file name>.tmp.<16 hex chars>` in the target's directory.
    fn random_tmp_path(&self) -> Result<PathBuf> {
        let mut buf = [0u8; 8];
        fill(&mut buf).context("OS random generator unavailable")?;
        let suffix: String = buf.iter().map(|b| format!("{b:02x}")).collect();

        let file_name = self
            .path
            .file_name()
            .with_context(|| format!("{} has no file name", self.path.display()))?
            .to_string_lossy();

        Ok(self.path.with_file_name(format!("{file_name}.tmp.{suffix}")))
    }

    #[cfg(target_os = "windows")]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<()> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{
            MOVEFILE_REPLACE_EXISTING, MOVEFILE_WRITE_THROUGH, MoveFileExW, REPLACEFILE_WRITE_THROUGH,
            ReplaceFileW,
        };

        fn to_wide(s: &OsStr) -> Vec<u16> {
            s.encode_wide().chain(std::iter::once(0)).collect()
        }

        let target_w = to_wide(self.path.as_os_str());
        let tmp_w = to_wide(tmp_path.as_os_str());

        // SAFETY: both buffers are NUL-terminated UTF-16 and outlive the call.
        let result = unsafe {
            if self.path.exists() {
                ReplaceFileW(
                    target_w.as_ptr(),
                    tmp_w.as_ptr(),
                    std::ptr::null(),
                    REPLACEFILE_WRITE_THROUGH,
                    std::ptr::null(),
                    std::ptr::null(),
                )
            } else {
                // ReplaceFileW needs an existing target
                MoveFileExW(
                    tmp_w.as_ptr(),
                    target_w.as_ptr(),
                    MOVEFILE_REPLACE_EXISTING | MOVEFILE_WRITE_THROUGH,
                )
            }
        };

        if result == 0 {
            return Err(std::io::Error::last_os_error()).context("atomic replace failed");
        }
        Ok(())
    }

    /// `rename()` is atomic within one filesystem, and the temp file always
    /// lives next to the target.
    #[cfg(not(target_os = "windows"))]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<()> {
        fs::rename(tmp_path, &self.path).context("atomic replace failed")
    }
}

#[cfg(unix)]
fn owner_only(options: &mut OpenOptions) -> &mut OpenOptions {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(0o600)
}

#[cfg(not(unix))]
fn owner_only(options: &mut OpenOptions) -> &mut OpenOptions {
    options
}
