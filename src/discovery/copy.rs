//! Copy fallback for locked cache files
//!
//! While the game runs, its embedded browser may hold the web cache file open
//! with sharing flags that refuse plain reads. The file can usually still be
//! copied by other means, so [`CopyChain`] tries an ordered list of
//! [`CopyStrategy`] values against a fresh temporary path and reads the copy.
//!
//! The temporary path is a [`TempPath`], removed when it goes out of scope on
//! every exit path, including early returns and panics.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::{NamedTempFile, TempPath};

use crate::utils::error::CopyError;

/// One way of copying `src` onto an existing, empty `dest`
pub trait CopyStrategy: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Copy the file; `false` when this strategy could not do it
    fn copy(&self, src: &Path, dest: &Path) -> bool;
}

/// Plain filesystem copy
pub struct DirectCopy;

impl CopyStrategy for DirectCopy {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn copy(&self, src: &Path, dest: &Path) -> bool {
        fs::copy(src, dest).is_ok()
    }
}

/// Copy through `robocopy`, which uses backup semantics when allowed
pub struct BulkCopy {
    binary: PathBuf,
}

impl BulkCopy {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    /// Locate `robocopy` in PATH
    pub fn from_path() -> Option<Self> {
        which::which("robocopy").ok().map(Self::new)
    }
}

impl CopyStrategy for BulkCopy {
    fn name(&self) -> &'static str {
        "robocopy"
    }

    fn copy(&self, src: &Path, dest: &Path) -> bool {
        let (Some(src_dir), Some(file_name)) = (src.parent(), src.file_name()) else {
            return false;
        };

        // robocopy copies into a directory under the original file name
        let Ok(scratch) = tempfile::tempdir() else {
            return false;
        };

        let status = Command::new(&self.binary)
            .arg(src_dir)
            .arg(scratch.path())
            .arg(file_name)
            .args(["/COPY:DAT", "/R:1", "/W:1"])
            .output();

        // exit codes below 8 mean at least partial success
        match status {
            Ok(output) if output.status.code().is_some_and(|code| code < 8) => {}
            _ => return false,
        }

        let copied = scratch.path().join(file_name);
        fs::rename(&copied, dest).is_ok() || fs::copy(&copied, dest).is_ok()
    }
}

/// Copy through PowerShell's `Copy-Item`
pub struct ShellCopy {
    binary: PathBuf,
}

impl ShellCopy {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    /// Locate `powershell` in PATH
    pub fn from_path() -> Option<Self> {
        which::which("powershell").ok().map(Self::new)
    }

    fn quote(path: &Path) -> String {
        format!("'{}'", path.display().to_string().replace('\'', "''"))
    }
}

impl CopyStrategy for ShellCopy {
    fn name(&self) -> &'static str {
        "powershell"
    }

    fn copy(&self, src: &Path, dest: &Path) -> bool {
        let script = format!(
            "Copy-Item -LiteralPath {} -Destination {} -Force -ErrorAction Stop",
            Self::quote(src),
            Self::quote(dest)
        );

        Command::new(&self.binary)
            .args(["-NoProfile", "-NonInteractive", "-Command", &script])
            .output()
            .is_ok_and(|output| output.status.success())
    }
}

/// Ordered copy strategies with a scoped temporary target
pub struct CopyChain {
    strategies: Vec<Box<dyn CopyStrategy>>,
}

impl CopyChain {
    pub fn new(strategies: Vec<Box<dyn CopyStrategy>>) -> Self {
        Self { strategies }
    }

    /// Direct copy, then whichever copy utilities this host provides
    pub fn system() -> Self {
        let mut strategies: Vec<Box<dyn CopyStrategy>> = vec![Box::new(DirectCopy)];
        if let Some(bulk) = BulkCopy::from_path() {
            strategies.push(Box::new(bulk));
        }
        if let Some(shell) = ShellCopy::from_path() {
            strategies.push(Box::new(shell));
        }
        Self::new(strategies)
    }

    /// Number of strategies in the chain
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Copy `src` to a temporary file with the first strategy that works and
    /// return the copy's bytes
    ///
    /// # Errors
    ///
    /// Returns `CopyError::Exhausted` when no strategy produced a non-empty copy
    pub fn read_via_copy(&self, src: &Path) -> Result<Vec<u8>, CopyError> {
        let temp: TempPath = NamedTempFile::new()
            .map_err(CopyError::TempFile)?
            .into_temp_path();

        for strategy in &self.strategies {
            if !strategy.copy(src, &temp) {
                tracing::debug!(strategy = strategy.name(), "Copy strategy failed");
                continue;
            }

            match fs::read(&temp) {
                Ok(bytes) if !bytes.is_empty() => {
                    tracing::debug!(
                        strategy = strategy.name(),
                        bytes = bytes.len(),
                        "Read cache through temporary copy"
                    );
                    return Ok(bytes);
                }
                Ok(_) => tracing::debug!(strategy = strategy.name(), "Copy produced an empty file"),
                Err(e) => tracing::debug!(strategy = strategy.name(), error = %e, "Failed to read copy"),
            }
        }

        Err(CopyError::Exhausted {
            path: src.display().to_string(),
            attempted: self.strategies.len(),
        })
    }
}
