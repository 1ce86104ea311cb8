//! `.xiseq` image-sequence descriptors.
//!
//! A descriptor only references image files; it stores no pixel data and is independent
//! of the raw/rawm container.

use std::{io::Write as _, path::Path, path::PathBuf};

use anyhow::Context as _;
use quick_xml::escape::escape;

use crate::{
    error::{RawmError, RawmResult},
    format::PixelFormat,
    listing::list_images,
    paths::create_new,
};

pub const XISEQ_EXT: &str = "xiseq";
pub const XISEQ_VERSION: &str = "4.8.2";

/// Descriptor text for `files` (paths relative to the descriptor), timestamps `0..n`.
pub fn xiseq_document(files: &[String], pixel_format: PixelFormat) -> String {
    let mut xml = String::new();
    xml.push_str(&format!("<ImageSequence version=\"{XISEQ_VERSION}\">\n"));
    xml.push_str(" <imageMetadata>\n");
    xml.push_str(&format!(
        "  <apiContextList>xiApiImg:format={}\n",
        pixel_format.api_tag()
    ));
    xml.push_str("  </apiContextList>\n");
    xml.push_str(" </imageMetadata>\n");
    for (timestamp, file) in files.iter().enumerate() {
        xml.push_str(&format!(
            " <file timestamp=\"{timestamp}\">{}</file>\n",
            escape(file.as_str())
        ));
    }
    xml.push_str("</ImageSequence>\n");
    xml
}

/// Write `<folder>.xiseq` next to `folder`, listing its images in natural order.
#[tracing::instrument(skip(folder), fields(folder = %folder.display()))]
pub fn write_xiseq(folder: &Path, pixel_format: PixelFormat) -> RawmResult<PathBuf> {
    let folder: PathBuf = folder.components().collect();
    let base = folder
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let images = list_images(&folder)?;
    if images.is_empty() {
        return Err(RawmError::NoImages(folder));
    }
    let files: Vec<String> = images
        .iter()
        .filter_map(|p| p.file_name())
        .map(|name| Path::new(&base).join(name).to_string_lossy().to_string())
        .collect();

    let mut out = folder.into_os_string();
    out.push(".");
    out.push(XISEQ_EXT);
    let out = PathBuf::from(out);

    let mut f = create_new(&out)?;
    f.write_all(xiseq_document(&files, pixel_format).as_bytes())
        .with_context(|| format!("write '{}'", out.display()))?;
    Ok(out)
}
