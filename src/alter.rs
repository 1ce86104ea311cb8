//! Derive a new movie from a temporal trim and stride of an existing one.
//!
//! The raw copy and the sidecar pruning both go through [`FrameSelection::contains`], so
//! the two outputs cannot disagree on which frames survive.

use std::{
    io::{BufWriter, IntoInnerError},
    path::Path,
};

use anyhow::Context as _;

use crate::{
    error::{RawmError, RawmResult},
    metadata::{FrameRecord, MovieMetadata},
    movie::{Movie, check_stream_len, stream_len},
    paths::{MoviePaths, OutputGuard, create_new},
    store::FrameWriter,
};

/// User-facing selection parameters. Frame numbers are 1-based and inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlterOpts {
    pub begin: u64,
    /// `None` means the last frame of the source.
    pub end: Option<u64>,
    pub step: u64,
}

impl Default for AlterOpts {
    fn default() -> Self {
        Self {
            begin: 1,
            end: None,
            step: 1,
        }
    }
}

impl AlterOpts {
    pub fn resolve(&self, n_frames: u64) -> RawmResult<FrameSelection> {
        FrameSelection::new(self.begin, self.end.unwrap_or(n_frames), self.step, n_frames)
    }
}

/// A validated `begin..=end` range (1-based) sampled every `step` frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSelection {
    begin: u64,
    end: u64,
    step: u64,
}

impl FrameSelection {
    pub fn new(begin: u64, end: u64, step: u64, n_frames: u64) -> RawmResult<Self> {
        if begin < 1 || begin > n_frames {
            return Err(RawmError::selection(format!(
                "begin must be in 1..={n_frames}, got {begin}"
            )));
        }
        if end < begin || end > n_frames {
            return Err(RawmError::selection(format!(
                "end must be in {begin}..={n_frames}, got {end}"
            )));
        }
        if step < 1 {
            return Err(RawmError::selection("step must be >= 1"));
        }
        Ok(Self { begin, end, step })
    }

    pub fn all(n_frames: u64) -> RawmResult<Self> {
        Self::new(1, n_frames, 1, n_frames)
    }

    pub fn begin(&self) -> u64 {
        self.begin
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    /// Whether zero-based source frame `i` is kept.
    pub fn contains(&self, i: u64) -> bool {
        let first = self.begin - 1;
        let last = self.end - 1;
        first <= i && i <= last && (i - first) % self.step == 0
    }

    /// Kept zero-based source indices, ascending.
    pub fn indices(&self) -> impl Iterator<Item = u64> {
        let sel = *self;
        (sel.begin - 1..sel.end).filter(move |&i| sel.contains(i))
    }

    /// Number of kept frames; a valid selection always keeps at least `begin`.
    pub fn frame_count(&self) -> u64 {
        (self.end - self.begin) / self.step + 1
    }
}

/// Sidecar of the derived movie.
///
/// Kept records are renumbered densely (`index == timestamp == output position`) and the
/// framerate, if any, is divided by the stride.
pub fn select_metadata(src: &MovieMetadata, sel: &FrameSelection) -> MovieMetadata {
    let frames: Vec<FrameRecord> = src
        .frames
        .iter()
        .enumerate()
        .filter(|(i, _)| sel.contains(*i as u64))
        .enumerate()
        .map(|(k, _)| FrameRecord::dense(k as u64))
        .collect();

    MovieMetadata {
        app_name: src.app_name.clone(),
        version: src.version.clone(),
        width: src.width,
        height: src.height,
        pixel_format: src.pixel_format,
        endianness: src.endianness.clone(),
        framerate: src.framerate.map(|fr| fr / sel.step() as f64),
        frames,
    }
}

#[derive(Clone, Debug)]
pub struct AlterSummary {
    pub output: MoviePaths,
    pub selection: FrameSelection,
    pub source_frames: u64,
    pub frames_written: u64,
    pub frame_size: u64,
}

/// Open `src_rawm` (with full cross-validation) and alter it into `dst`.
pub fn alter_movie_file(
    src_rawm: &Path,
    dst: &MoviePaths,
    opts: &AlterOpts,
) -> RawmResult<AlterSummary> {
    let src = Movie::open(src_rawm)?;
    alter_movie(&src, dst, opts)
}

#[tracing::instrument(
    skip_all,
    fields(src = %src.paths().rawm.display(), dst = %dst.rawm.display())
)]
pub fn alter_movie(src: &Movie, dst: &MoviePaths, opts: &AlterOpts) -> RawmResult<AlterSummary> {
    let sel = opts.resolve(src.n_frames())?;
    let metadata = select_metadata(src.metadata(), &sel);

    // One frame size governs validation, reads and writes.
    let frame_size = src.frame_size();
    debug_assert_eq!(metadata.frame_size(), frame_size);

    dst.ensure_absent()?;
    let mut reader = src.reader()?;

    tracing::debug!(
        begin = sel.begin(),
        end = sel.end(),
        step = sel.step(),
        selected = sel.frame_count(),
        "selected frames"
    );

    let mut guard = OutputGuard::new();
    let raw = create_new(&dst.raw)?;
    guard.track(&dst.raw);

    let mut writer = FrameWriter::new(BufWriter::new(raw), frame_size);
    let mut buf = vec![0u8; frame_size as usize];
    for i in sel.indices() {
        reader.read_frame_into(i, &mut buf)?;
        writer.push(&buf)?;
    }
    let frames_written = writer.frames_written();

    let raw = writer
        .finish()?
        .into_inner()
        .map_err(IntoInnerError::into_error)
        .context("flush raw stream")?;
    raw.sync_all()
        .with_context(|| format!("sync '{}'", dst.raw.display()))?;
    drop(raw);

    check_stream_len(&metadata, stream_len(&dst.raw)?)?;
    metadata.write_to(&dst.rawm)?;
    guard.commit();

    tracing::info!(
        source_frames = src.n_frames(),
        frames_written,
        "altered movie"
    );
    Ok(AlterSummary {
        output: dst.clone(),
        selection: sel,
        source_frames: src.n_frames(),
        frames_written,
        frame_size,
    })
}
