//! Grayscale movies stored as a raw pixel stream (`.raw`) plus an XML frame index (`.rawm`).
//!
//! - [`ingest_folder`] builds a movie from a folder of same-sized grayscale images.
//! - [`Movie::open`] validates a movie: the raw stream must hold exactly
//!   `n_frames * frame_size` bytes.
//! - [`alter_movie`] derives a new movie from a trimmed, strided frame selection.
#![forbid(unsafe_code)]

pub mod alter;
pub mod error;
pub mod extract;
pub mod format;
pub mod ingest;
pub mod listing;
pub mod metadata;
pub mod movie;
pub mod paths;
pub mod store;
pub mod xiseq;

pub use alter::{AlterOpts, AlterSummary, FrameSelection, alter_movie, alter_movie_file};
pub use error::{RawmError, RawmResult};
pub use extract::{ExtractOpts, ImageKind, extract_frames};
pub use format::PixelFormat;
pub use ingest::{IngestOpts, IngestSummary, ingest_folder, ingest_images};
pub use metadata::{FrameRecord, MovieMetadata};
pub use movie::{Movie, MovieReader};
pub use paths::MoviePaths;
pub use xiseq::write_xiseq;
