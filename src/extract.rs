use std::path::PathBuf;

use anyhow::Context as _;
use image::DynamicImage;

use crate::{
    error::{RawmError, RawmResult},
    movie::Movie,
    paths::OutputGuard,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ImageKind {
    #[default]
    Tiff,
    Png,
}

impl ImageKind {
    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Tiff => "tif",
            ImageKind::Png => "png",
        }
    }

    fn image_format(self) -> image::ImageFormat {
        match self {
            ImageKind::Tiff => image::ImageFormat::Tiff,
            ImageKind::Png => image::ImageFormat::Png,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExtractOpts {
    pub out_dir: PathBuf,
    pub kind: ImageKind,
    pub prefix: String,
}

impl ExtractOpts {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            kind: ImageKind::default(),
            prefix: "frame_".to_string(),
        }
    }

    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.out_dir.join(format!(
            "{}{index:05}.{}",
            self.prefix,
            self.kind.extension()
        ))
    }
}

/// Write every frame of `movie` as a single-channel image (8-bit for `Mono8`, 16-bit
/// otherwise). Sample values are copied unscaled.
#[tracing::instrument(
    skip_all,
    fields(rawm = %movie.paths().rawm.display(), out = %opts.out_dir.display())
)]
pub fn extract_frames(movie: &Movie, opts: &ExtractOpts) -> RawmResult<Vec<PathBuf>> {
    let meta = movie.metadata();
    let targets: Vec<PathBuf> = (0..movie.n_frames()).map(|i| opts.frame_path(i)).collect();
    if let Some(existing) = targets.iter().find(|p| p.exists()) {
        return Err(RawmError::OutputExists(existing.clone()));
    }
    std::fs::create_dir_all(&opts.out_dir)
        .with_context(|| format!("create output dir '{}'", opts.out_dir.display()))?;

    let mut reader = movie.reader()?;
    let mut buf = vec![0u8; movie.frame_size() as usize];
    let mut guard = OutputGuard::new();
    for (i, path) in targets.iter().enumerate() {
        reader.read_frame_into(i as u64, &mut buf)?;
        let img = if meta.pixel_format.bytes_per_pixel() == 1 {
            image::GrayImage::from_raw(meta.width, meta.height, buf.clone())
                .map(DynamicImage::ImageLuma8)
        } else {
            image::ImageBuffer::from_raw(meta.width, meta.height, meta.decode_samples(&buf)?)
                .map(DynamicImage::ImageLuma16)
        }
        .context("frame buffer does not match movie dimensions")?;

        guard.track(path);
        img.save_with_format(path, opts.kind.image_format())
            .with_context(|| format!("write image '{}'", path.display()))?;
    }
    guard.commit();

    tracing::info!(frames = targets.len(), "extracted frames");
    Ok(targets)
}
