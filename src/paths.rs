use std::{
    ffi::OsString,
    fs::{File, OpenOptions},
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::error::{RawmError, RawmResult};

pub const RAW_EXT: &str = "raw";
pub const RAWM_EXT: &str = "rawm";

/// The two files making up one movie: `<base>.raw` and `<base>.rawm`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoviePaths {
    pub raw: PathBuf,
    pub rawm: PathBuf,
}

impl MoviePaths {
    pub fn from_base(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            raw: with_ext(base, RAW_EXT),
            rawm: with_ext(base, RAWM_EXT),
        }
    }

    pub fn from_rawm(rawm: impl AsRef<Path>) -> RawmResult<Self> {
        let rawm = rawm.as_ref();
        if !has_rawm_ext(rawm) {
            return Err(RawmError::malformed(format!(
                "'{}' does not have the .{RAWM_EXT} extension",
                rawm.display()
            )));
        }
        Ok(Self::from_base(rawm.with_extension("")))
    }

    /// Outputs of ingesting `folder`, placed next to it (`data/run1/` -> `data/run1.raw`).
    pub fn for_folder(folder: impl AsRef<Path>) -> Self {
        // Collecting components drops trailing separators.
        let folder: PathBuf = folder.as_ref().components().collect();
        Self::from_base(folder)
    }

    pub fn base(&self) -> PathBuf {
        self.rawm.with_extension("")
    }

    /// Sibling pair with `suffix` appended to the base name (`movie` -> `movie_out`).
    pub fn with_suffix(&self, suffix: &str) -> Self {
        let mut base = self.base().into_os_string();
        base.push(suffix);
        Self::from_base(PathBuf::from(base))
    }

    pub fn ensure_absent(&self) -> RawmResult<()> {
        for p in [&self.rawm, &self.raw] {
            if p.exists() {
                return Err(RawmError::OutputExists(p.clone()));
            }
        }
        Ok(())
    }
}

pub fn has_rawm_ext(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == RAWM_EXT)
}

fn with_ext(base: &Path, ext: &str) -> PathBuf {
    let mut s = OsString::from(base.as_os_str());
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

/// Create a file for writing, refusing to replace an existing one.
pub fn create_new(path: &Path) -> RawmResult<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => RawmError::OutputExists(path.to_path_buf()),
            _ => RawmError::Other(
                anyhow::Error::new(e).context(format!("create '{}'", path.display())),
            ),
        })
}

/// Removes the files an operation created unless it is committed.
///
/// Producers register each output right after creating it, so a failure part-way leaves no
/// half-written movie behind.
#[derive(Debug, Default)]
pub struct OutputGuard {
    created: Vec<PathBuf>,
    committed: bool,
}

impl OutputGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, path: impl Into<PathBuf>) {
        self.created.push(path.into());
    }

    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for p in self.created.drain(..) {
            if let Err(e) = std::fs::remove_file(&p) {
                tracing::warn!(path = %p.display(), error = %e, "failed to remove partial output");
            } else {
                tracing::debug!(path = %p.display(), "removed partial output");
            }
        }
    }
}
