use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;

use crate::{
    error::{RawmError, RawmResult},
    metadata::MovieMetadata,
    paths::MoviePaths,
    store,
};

/// A validated movie on disk: the sidecar is parsed and the raw stream length agrees with it.
#[derive(Clone, Debug)]
pub struct Movie {
    metadata: MovieMetadata,
    paths: MoviePaths,
}

impl Movie {
    /// Open `<base>.rawm` and cross-check it against `<base>.raw`.
    pub fn open(rawm: impl AsRef<Path>) -> RawmResult<Self> {
        Self::open_paths(MoviePaths::from_rawm(rawm)?)
    }

    #[tracing::instrument(skip(paths), fields(rawm = %paths.rawm.display()))]
    pub fn open_paths(paths: MoviePaths) -> RawmResult<Self> {
        let metadata = MovieMetadata::read_from(&paths.rawm)?;
        let actual = stream_len(&paths.raw)?;
        check_stream_len(&metadata, actual)?;
        tracing::debug!(
            frames = metadata.n_frames(),
            frame_size = metadata.frame_size(),
            "opened movie"
        );
        Ok(Self { metadata, paths })
    }

    pub fn metadata(&self) -> &MovieMetadata {
        &self.metadata
    }

    pub fn paths(&self) -> &MoviePaths {
        &self.paths
    }

    pub fn n_frames(&self) -> u64 {
        self.metadata.n_frames()
    }

    pub fn frame_size(&self) -> u64 {
        self.metadata.frame_size()
    }

    pub fn reader(&self) -> RawmResult<MovieReader> {
        let file = File::open(&self.paths.raw).map_err(|source| RawmError::StreamUnreadable {
            path: self.paths.raw.clone(),
            source,
        })?;
        // The stream may have changed since `open`.
        let actual = file
            .metadata()
            .with_context(|| format!("stat '{}'", self.paths.raw.display()))?
            .len();
        check_stream_len(&self.metadata, actual)?;
        Ok(MovieReader {
            stream: BufReader::new(file),
            path: self.paths.raw.clone(),
            frame_size: self.frame_size(),
            n_frames: self.n_frames(),
        })
    }
}

/// Byte length of a raw stream, or `StreamUnreadable`.
pub fn stream_len(raw: &Path) -> RawmResult<u64> {
    std::fs::metadata(raw)
        .map(|m| m.len())
        .map_err(|source| RawmError::StreamUnreadable {
            path: raw.to_path_buf(),
            source,
        })
}

/// The one invariant every readable movie satisfies: `len == n_frames * frame_size`.
pub fn check_stream_len(metadata: &MovieMetadata, actual: u64) -> RawmResult<()> {
    let expected = metadata.expected_stream_len();
    if actual != expected {
        return Err(RawmError::SizeMismatch { expected, actual });
    }
    Ok(())
}

/// Random-access frame reads over a validated raw stream.
pub struct MovieReader {
    stream: BufReader<File>,
    path: PathBuf,
    frame_size: u64,
    n_frames: u64,
}

impl MovieReader {
    pub fn frame_size(&self) -> u64 {
        self.frame_size
    }

    pub fn n_frames(&self) -> u64 {
        self.n_frames
    }

    pub fn read_frame(&mut self, index: u64) -> RawmResult<Vec<u8>> {
        let mut buf = vec![0u8; self.frame_size as usize];
        self.read_frame_into(index, &mut buf)?;
        Ok(buf)
    }

    pub fn read_frame_into(&mut self, index: u64, buf: &mut [u8]) -> RawmResult<()> {
        if index >= self.n_frames {
            return Err(RawmError::selection(format!(
                "frame {index} is out of range for '{}' ({} frames)",
                self.path.display(),
                self.n_frames
            )));
        }
        if buf.len() as u64 != self.frame_size {
            return Err(RawmError::SizeMismatch {
                expected: self.frame_size,
                actual: buf.len() as u64,
            });
        }
        store::read_frame_into(&mut self.stream, index, buf)
    }
}
