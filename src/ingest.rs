use std::{
    io::{BufWriter, IntoInnerError},
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use image::DynamicImage;

use crate::{
    error::{RawmError, RawmResult},
    format::PixelFormat,
    listing::list_images,
    metadata::MovieMetadata,
    movie::{check_stream_len, stream_len},
    paths::{MoviePaths, OutputGuard, create_new},
    store::FrameWriter,
};

#[derive(Clone, Debug, Default)]
pub struct IngestOpts {
    pub pixel_format: PixelFormat,
    /// Written to the sidecar when set; ingestion has no timing information of its own.
    pub framerate: Option<f64>,
}

impl IngestOpts {
    pub fn new(pixel_format: PixelFormat) -> Self {
        Self {
            pixel_format,
            framerate: None,
        }
    }

    pub fn validate(&self) -> RawmResult<()> {
        if let Some(fr) = self.framerate
            && !(fr.is_finite() && fr > 0.0)
        {
            return Err(RawmError::malformed(format!(
                "ingest framerate must be positive, got {fr}"
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct IngestSummary {
    pub output: MoviePaths,
    pub frames: u64,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub bytes_written: u64,
}

/// Decoded single-channel image, pixel bytes exactly as they go into the raw stream.
#[derive(Clone, Debug)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: u32,
    pub data: Vec<u8>,
}

/// Decode a grayscale image file. 16-bit samples are laid out in native byte order.
pub fn decode_gray(path: &Path) -> RawmResult<DecodedFrame> {
    let img = image::open(path).with_context(|| format!("decode image '{}'", path.display()))?;
    let (width, height) = (img.width(), img.height());
    let (bytes_per_pixel, data) = match img {
        DynamicImage::ImageLuma8(buf) => (1, buf.into_raw()),
        DynamicImage::ImageLuma16(buf) => (
            2,
            buf.into_raw()
                .into_iter()
                .flat_map(u16::to_ne_bytes)
                .collect(),
        ),
        // Palettized grayscale (BMP) decodes to RGB with equal channels.
        DynamicImage::ImageRgb8(buf) if buf.pixels().all(|p| p[0] == p[1] && p[1] == p[2]) => {
            (1, buf.pixels().map(|p| p[0]).collect())
        }
        DynamicImage::ImageRgba8(buf)
            if buf
                .pixels()
                .all(|p| p[0] == p[1] && p[1] == p[2] && p[3] == u8::MAX) =>
        {
            (1, buf.pixels().map(|p| p[0]).collect())
        }
        other => {
            return Err(RawmError::UnsupportedChannelLayout {
                path: path.to_path_buf(),
                layout: format!("{:?}", other.color()),
            });
        }
    };
    Ok(DecodedFrame {
        width,
        height,
        bytes_per_pixel,
        data,
    })
}

fn check_pixel_width(path: &Path, frame: &DecodedFrame, format: PixelFormat) -> RawmResult<()> {
    if frame.bytes_per_pixel != format.bytes_per_pixel() {
        return Err(RawmError::PixelFormatMismatch {
            path: path.to_path_buf(),
            expected: format.bytes_per_pixel(),
            actual: frame.bytes_per_pixel,
        });
    }
    Ok(())
}

/// Build `<folder>.raw` and `<folder>.rawm` next to `folder`.
#[tracing::instrument(
    skip_all,
    fields(folder = %folder.display(), format = %opts.pixel_format)
)]
pub fn ingest_folder(folder: &Path, opts: &IngestOpts) -> RawmResult<IngestSummary> {
    let images = list_images(folder)?;
    if images.is_empty() {
        return Err(RawmError::NoImages(folder.to_path_buf()));
    }
    ingest_images(&images, &MoviePaths::for_folder(folder), opts)
}

/// Build a movie from `images`, taken as already being in frame order.
pub fn ingest_images(
    images: &[PathBuf],
    out: &MoviePaths,
    opts: &IngestOpts,
) -> RawmResult<IngestSummary> {
    opts.validate()?;
    let Some((first_path, rest)) = images.split_first() else {
        return Err(RawmError::NoImages(out.base()));
    };

    // Everything the first image can reject is checked before any output exists.
    let first = decode_gray(first_path)?;
    check_pixel_width(first_path, &first, opts.pixel_format)?;
    out.ensure_absent()?;

    let mut metadata = MovieMetadata::new(first.width, first.height, opts.pixel_format)
        .with_dense_frames(images.len() as u64);
    metadata.framerate = opts.framerate;

    let mut guard = OutputGuard::new();
    let raw = create_new(&out.raw)?;
    guard.track(&out.raw);

    let mut writer = FrameWriter::new(BufWriter::new(raw), metadata.frame_size());
    writer.push(&first.data)?;
    drop(first);

    for path in rest {
        let frame = decode_gray(path)?;
        if (frame.width, frame.height) != (metadata.width, metadata.height) {
            return Err(RawmError::DimensionMismatch {
                path: path.clone(),
                expected: (metadata.width, metadata.height),
                actual: (frame.width, frame.height),
            });
        }
        check_pixel_width(path, &frame, opts.pixel_format)?;
        writer.push(&frame.data)?;
        tracing::trace!(frame = writer.frames_written() - 1, path = %path.display(), "appended");
    }

    let raw = writer
        .finish()?
        .into_inner()
        .map_err(IntoInnerError::into_error)
        .context("flush raw stream")?;
    raw.sync_all()
        .with_context(|| format!("sync '{}'", out.raw.display()))?;
    drop(raw);

    let bytes_written = stream_len(&out.raw)?;
    check_stream_len(&metadata, bytes_written)?;
    metadata.write_to(&out.rawm)?;
    guard.commit();

    tracing::info!(
        frames = metadata.n_frames(),
        width = metadata.width,
        height = metadata.height,
        "ingested movie"
    );
    Ok(IngestSummary {
        output: out.clone(),
        frames: metadata.n_frames(),
        width: metadata.width,
        height: metadata.height,
        pixel_format: metadata.pixel_format,
        bytes_written,
    })
}
