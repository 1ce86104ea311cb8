use std::path::PathBuf;

pub type RawmResult<T> = Result<T, RawmError>;

#[derive(thiserror::Error, Debug)]
pub enum RawmError {
    #[error("unsupported pixel format: '{0}'")]
    UnsupportedFormat(String),

    #[error("malformed metadata: {0}")]
    MalformedMetadata(String),

    #[error("size mismatch: raw stream holds {actual} bytes, metadata describes {expected}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("stream unreadable: '{}': {source}", .path.display())]
    StreamUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("truncated stream: short read in frame {index} ({frame_size} bytes expected)")]
    TruncatedStream { index: u64, frame_size: u64 },

    #[error(
        "pixel format mismatch: '{}' stores {actual} byte(s) per pixel, format needs {expected}",
        .path.display()
    )]
    PixelFormatMismatch {
        path: PathBuf,
        expected: u32,
        actual: u32,
    },

    #[error(
        "unsupported channel layout: '{}' is {layout}, expected single-channel grayscale",
        .path.display()
    )]
    UnsupportedChannelLayout { path: PathBuf, layout: String },

    #[error(
        "dimension mismatch: '{}' is {}x{}, movie is {}x{}",
        .path.display(), .actual.0, .actual.1, .expected.0, .expected.1
    )]
    DimensionMismatch {
        path: PathBuf,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("no images found in '{}'", .0.display())]
    NoImages(PathBuf),

    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    #[error("output exists: '{}'", .0.display())]
    OutputExists(PathBuf),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RawmError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedMetadata(msg.into())
    }

    pub fn selection(msg: impl Into<String>) -> Self {
        Self::InvalidSelection(msg.into())
    }

    pub fn unsupported_format(name: impl Into<String>) -> Self {
        Self::UnsupportedFormat(name.into())
    }
}
