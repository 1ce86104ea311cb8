use std::{io::Write as _, path::Path};

use anyhow::Context as _;
use quick_xml::{
    Reader,
    escape::escape,
    events::{BytesStart, Event},
};

use crate::{
    error::{RawmError, RawmResult},
    format::PixelFormat,
    paths::create_new,
    store,
};

pub const ROOT_TAG: &str = "movie_metadata";
pub const DEFAULT_APP_NAME: &str = "xiFastMovie";
pub const DEFAULT_VERSION: &str = "1.4";

/// One entry of the sidecar frame block.
///
/// Position in [`MovieMetadata::frames`] is the frame's position in the raw stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameRecord {
    pub index: u64,
    pub timestamp: u64,
}

impl FrameRecord {
    pub fn dense(index: u64) -> Self {
        Self {
            index,
            timestamp: index,
        }
    }
}

/// In-memory form of a `.rawm` sidecar.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MovieMetadata {
    pub app_name: String,
    pub version: String,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    /// Recorded for provenance; only sample decoding looks at it.
    pub endianness: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framerate: Option<f64>,
    pub frames: Vec<FrameRecord>,
}

pub fn native_endianness() -> &'static str {
    if cfg!(target_endian = "big") {
        "big"
    } else {
        "little"
    }
}

impl MovieMetadata {
    /// Header for a new movie written on this machine, with no frames yet.
    pub fn new(width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            version: DEFAULT_VERSION.to_string(),
            width,
            height,
            pixel_format,
            endianness: native_endianness().to_string(),
            framerate: None,
            frames: Vec::new(),
        }
    }

    /// Replace the frame block with `n` records `{index: i, timestamp: i}`.
    pub fn with_dense_frames(mut self, n: u64) -> Self {
        self.frames = (0..n).map(FrameRecord::dense).collect();
        self
    }

    pub fn n_frames(&self) -> u64 {
        self.frames.len() as u64
    }

    /// Saturates at `u64::MAX`; [`validate`](Self::validate) rejects such headers.
    pub fn frame_size(&self) -> u64 {
        store::frame_size(self.width, self.height, self.pixel_format).unwrap_or(u64::MAX)
    }

    /// Length the companion raw stream must have. Saturates like [`frame_size`](Self::frame_size).
    pub fn expected_stream_len(&self) -> u64 {
        self.checked_stream_len().unwrap_or(u64::MAX)
    }

    fn checked_stream_len(&self) -> Option<u64> {
        store::frame_size(self.width, self.height, self.pixel_format)?.checked_mul(self.n_frames())
    }

    pub fn validate(&self) -> RawmResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RawmError::malformed("width/height must be > 0"));
        }
        if self.frames.is_empty() {
            return Err(RawmError::malformed("no frame records"));
        }
        if self.checked_stream_len().is_none() {
            return Err(RawmError::malformed(format!(
                "frame size overflows: {}x{} {} x {} frames",
                self.width,
                self.height,
                self.pixel_format,
                self.n_frames()
            )));
        }
        if let Some(fr) = self.framerate
            && !(fr.is_finite() && fr > 0.0)
        {
            return Err(RawmError::malformed(format!(
                "framerate must be positive, got {fr}"
            )));
        }
        Ok(())
    }

    /// Decode one frame of raw bytes into samples, honoring the recorded byte order.
    pub fn decode_samples(&self, frame: &[u8]) -> RawmResult<Vec<u16>> {
        if frame.len() as u64 != self.frame_size() {
            return Err(RawmError::SizeMismatch {
                expected: self.frame_size(),
                actual: frame.len() as u64,
            });
        }
        if self.pixel_format.bytes_per_pixel() == 1 {
            return Ok(frame.iter().map(|&b| u16::from(b)).collect());
        }
        let from_bytes: fn([u8; 2]) -> u16 = match self.endianness.as_str() {
            "little" => u16::from_le_bytes,
            "big" => u16::from_be_bytes,
            other => {
                return Err(RawmError::malformed(format!(
                    "unknown endianness '{other}'"
                )));
            }
        };
        Ok(frame
            .chunks_exact(2)
            .map(|px| from_bytes([px[0], px[1]]))
            .collect())
    }

    pub fn read_from(path: &Path) -> RawmResult<Self> {
        let doc = std::fs::read_to_string(path)
            .with_context(|| format!("read metadata '{}'", path.display()))?;
        Self::parse(&doc)
    }

    /// Write the sidecar to a file that must not exist yet.
    pub fn write_to(&self, path: &Path) -> RawmResult<()> {
        let mut f = create_new(path)?;
        f.write_all(self.to_xml().as_bytes())
            .with_context(|| format!("write metadata '{}'", path.display()))?;
        f.sync_all()
            .with_context(|| format!("sync metadata '{}'", path.display()))?;
        Ok(())
    }

    #[tracing::instrument(skip(doc), fields(len = doc.len()))]
    pub fn parse(doc: &str) -> RawmResult<Self> {
        let mut reader = Reader::from_str(doc);
        reader.config_mut().trim_text(true);

        let mut path: Vec<String> = Vec::new();
        let mut root_seen = false;
        let mut app_name = None;
        let mut version = None;
        let mut header = HeaderText::default();
        let mut frames = Vec::new();

        loop {
            let event = reader
                .read_event()
                .map_err(|e| RawmError::malformed(format!("xml: {e}")))?;
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let name = element_name(e)?;
                    if path.is_empty() {
                        if root_seen {
                            return Err(RawmError::malformed(format!(
                                "unexpected element '{name}' after root"
                            )));
                        }
                        if name != ROOT_TAG {
                            return Err(RawmError::malformed(format!(
                                "root element is '{name}', expected '{ROOT_TAG}'"
                            )));
                        }
                        root_seen = true;
                        (app_name, version) = root_attributes(e)?;
                    } else if name == "frame" && path.len() == 2 && path[1] == "frames" {
                        frames.push(frame_record(e, frames.len())?);
                    } else if path.len() == 2 && path[1] == "header" {
                        header.open(&name)?;
                    }
                    if matches!(event, Event::Start(_)) {
                        path.push(name);
                    }
                }
                Event::End(_) => {
                    path.pop();
                }
                Event::Text(t) => {
                    if path.len() == 3 && path[1] == "header" {
                        let text = t
                            .unescape()
                            .map_err(|e| RawmError::malformed(format!("header text: {e}")))?;
                        header.push(&path[2], &text);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !root_seen {
            return Err(RawmError::malformed(format!(
                "missing root element '{ROOT_TAG}'"
            )));
        }
        if !path.is_empty() {
            return Err(RawmError::malformed(format!(
                "document ends inside '{}'",
                path.join("/")
            )));
        }

        let framerate = header.framerate();
        let metadata = Self {
            app_name: app_name.unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            version: version.unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            width: parse_dimension(header.width.as_deref(), "width")?,
            height: parse_dimension(header.height.as_deref(), "height")?,
            pixel_format: header.pixel_format()?,
            endianness: header
                .endianness
                .unwrap_or_else(|| "little".to_string()),
            framerate,
            frames,
        };
        metadata.validate()?;
        Ok(metadata)
    }

    /// Deterministic sidecar text. `framerate` is written only when present.
    pub fn to_xml(&self) -> String {
        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\" ?>\n");
        xml.push_str(&format!(
            "<{ROOT_TAG} app_name=\"{}\" version=\"{}\">\n",
            escape(self.app_name.as_str()),
            escape(self.version.as_str())
        ));
        xml.push_str("\t<header>\n");
        xml.push_str(&format!("\t\t<width>{}</width>\n", self.width));
        xml.push_str(&format!("\t\t<height>{}</height>\n", self.height));
        xml.push_str(&format!(
            "\t\t<pixel_format>{}</pixel_format>\n",
            self.pixel_format.name()
        ));
        xml.push_str(&format!(
            "\t\t<endianness>{}</endianness>\n",
            escape(self.endianness.as_str())
        ));
        if let Some(fr) = self.framerate {
            xml.push_str(&format!("\t\t<framerate>{fr}</framerate>\n"));
        }
        xml.push_str("\t</header>\n");
        xml.push_str("\t<frames>\n");
        for f in &self.frames {
            xml.push_str(&format!(
                "\t\t<frame frame=\"{}\" timestamp=\"{}\" />\n",
                f.index, f.timestamp
            ));
        }
        xml.push_str("\t</frames>\n");
        xml.push_str(&format!("</{ROOT_TAG}>\n"));
        xml
    }
}

#[derive(Default)]
struct HeaderText {
    width: Option<String>,
    height: Option<String>,
    pixel_format: Option<String>,
    // Pre-1.3 sidecars only know MONO8 under this name.
    image_data_format: Option<String>,
    endianness: Option<String>,
    framerate: Option<String>,
}

impl HeaderText {
    fn slot(&mut self, field: &str) -> Option<&mut Option<String>> {
        match field {
            "width" => Some(&mut self.width),
            "height" => Some(&mut self.height),
            "pixel_format" => Some(&mut self.pixel_format),
            "image_data_format" => Some(&mut self.image_data_format),
            "endianness" => Some(&mut self.endianness),
            "framerate" => Some(&mut self.framerate),
            _ => None,
        }
    }

    /// Start of a header element; each known field may appear once.
    fn open(&mut self, field: &str) -> RawmResult<()> {
        let Some(slot) = self.slot(field) else {
            return Ok(());
        };
        if slot.is_some() {
            return Err(RawmError::malformed(format!(
                "header field '{field}' appears more than once"
            )));
        }
        *slot = Some(String::new());
        Ok(())
    }

    fn push(&mut self, field: &str, text: &str) {
        if let Some(slot) = self.slot(field) {
            slot.get_or_insert_with(String::new).push_str(text);
        }
    }

    fn pixel_format(&self) -> RawmResult<PixelFormat> {
        match (&self.pixel_format, &self.image_data_format) {
            (Some(name), _) => name.parse(),
            (None, Some(legacy)) if legacy.trim() == "MONO8" => Ok(PixelFormat::Mono8),
            (None, Some(legacy)) => Err(RawmError::unsupported_format(legacy.trim())),
            (None, None) => Ok(PixelFormat::Mono8),
        }
    }

    fn framerate(&self) -> Option<f64> {
        let raw = self.framerate.as_deref()?;
        match raw.trim().parse::<f64>() {
            Ok(fr) if fr.is_finite() && fr > 0.0 => Some(fr),
            _ => {
                tracing::warn!(framerate = raw, "ignoring unreadable framerate");
                None
            }
        }
    }
}

fn element_name(e: &BytesStart<'_>) -> RawmResult<String> {
    std::str::from_utf8(e.name().as_ref())
        .map(str::to_owned)
        .map_err(|err| RawmError::malformed(format!("element name is not utf-8: {err}")))
}

fn root_attributes(e: &BytesStart<'_>) -> RawmResult<(Option<String>, Option<String>)> {
    let mut app_name = None;
    let mut version = None;
    for attr in e.attributes() {
        let attr = attr.map_err(|err| RawmError::malformed(format!("root attribute: {err}")))?;
        let value = attr
            .unescape_value()
            .map_err(|err| RawmError::malformed(format!("root attribute: {err}")))?;
        match attr.key.as_ref() {
            b"app_name" => app_name = Some(value.into_owned()),
            b"version" => version = Some(value.into_owned()),
            _ => {}
        }
    }
    Ok((app_name, version))
}

fn frame_record(e: &BytesStart<'_>, position: usize) -> RawmResult<FrameRecord> {
    let mut index = None;
    let mut timestamp = None;
    for attr in e.attributes() {
        let attr = attr
            .map_err(|err| RawmError::malformed(format!("frame record {position}: {err}")))?;
        let value = attr
            .unescape_value()
            .map_err(|err| RawmError::malformed(format!("frame record {position}: {err}")))?;
        let slot = match attr.key.as_ref() {
            b"frame" => &mut index,
            b"timestamp" => &mut timestamp,
            _ => continue,
        };
        let parsed = value.trim().parse::<u64>().map_err(|_| {
            RawmError::malformed(format!(
                "frame record {position}: '{}' is not a non-negative integer",
                value.trim()
            ))
        })?;
        *slot = Some(parsed);
    }
    let timestamp = timestamp.ok_or_else(|| {
        RawmError::malformed(format!("frame record {position} has no timestamp"))
    })?;
    Ok(FrameRecord {
        index: index.unwrap_or(position as u64),
        timestamp,
    })
}

fn parse_dimension(text: Option<&str>, field: &str) -> RawmResult<u32> {
    let text = text.ok_or_else(|| RawmError::malformed(format!("missing header field '{field}'")))?;
    match text.trim().parse::<u32>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(RawmError::malformed(format!(
            "header field '{field}' must be a positive integer, got '{}'",
            text.trim()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>
<movie_metadata app_name="xiFastMovie" version="1.4">
	<header>
		<width>4</width>
		<height>3</height>
		<pixel_format>Mono12</pixel_format>
		<endianness>little</endianness>
		<framerate>30</framerate>
	</header>
	<frames>
	<frame frame="0" timestamp="0" />
	<frame frame="1" timestamp="5" />
	<frame frame="2" timestamp="9" />
	</frames>
</movie_metadata>
"#;

    fn with_header(header: &str) -> String {
        format!(
            "<movie_metadata app_name=\"a\" version=\"1.4\"><header>{header}</header>\
             <frames><frame frame=\"0\" timestamp=\"0\"/></frames></movie_metadata>"
        )
    }

    #[test]
    fn parses_header_and_frames_in_order() {
        let m = MovieMetadata::parse(SAMPLE).unwrap();
        assert_eq!((m.width, m.height), (4, 3));
        assert_eq!(m.pixel_format, PixelFormat::Mono12);
        assert_eq!(m.endianness, "little");
        assert_eq!(m.framerate, Some(30.0));
        assert_eq!(m.app_name, "xiFastMovie");
        assert_eq!(m.n_frames(), 3);
        assert_eq!(m.frames[1], FrameRecord { index: 1, timestamp: 5 });
        assert_eq!(m.frame_size(), 24);
        assert_eq!(m.expected_stream_len(), 72);
    }

    #[test]
    fn serialize_then_parse_is_semantically_equal() {
        let m = MovieMetadata::parse(SAMPLE).unwrap();
        let again = MovieMetadata::parse(&m.to_xml()).unwrap();
        assert_eq!(m, again);
        assert_eq!(again.to_xml(), m.to_xml());
    }

    #[test]
    fn pixel_format_is_written_capitalized() {
        let xml = MovieMetadata::new(2, 2, PixelFormat::Mono16)
            .with_dense_frames(1)
            .to_xml();
        assert!(xml.contains("<pixel_format>Mono16</pixel_format>"));
        assert!(!xml.contains("framerate"));
    }

    #[test]
    fn wrong_or_missing_root_is_malformed() {
        let err = MovieMetadata::parse("<ImageSequence version=\"4.8.2\"/>").unwrap_err();
        assert!(matches!(err, RawmError::MalformedMetadata(_)));
        let err = MovieMetadata::parse("").unwrap_err();
        assert!(matches!(err, RawmError::MalformedMetadata(_)));
        let err = MovieMetadata::parse("<movie_metadata><header>").unwrap_err();
        assert!(matches!(err, RawmError::MalformedMetadata(_)));
    }

    #[test]
    fn dimensions_must_be_positive_integers() {
        for header in [
            "<height>3</height>",
            "<width>0</width><height>3</height>",
            "<width>-4</width><height>3</height>",
            "<width>four</width><height>3</height>",
        ] {
            let err = MovieMetadata::parse(&with_header(header)).unwrap_err();
            assert!(matches!(err, RawmError::MalformedMetadata(_)), "{header}");
        }
    }

    #[test]
    fn pixel_format_defaults_to_mono8_and_rejects_unknown() {
        let m = MovieMetadata::parse(&with_header("<width>2</width><height>2</height>")).unwrap();
        assert_eq!(m.pixel_format, PixelFormat::Mono8);
        assert_eq!(m.endianness, "little");

        let err = MovieMetadata::parse(&with_header(
            "<width>2</width><height>2</height><pixel_format>Mono9</pixel_format>",
        ))
        .unwrap_err();
        assert!(matches!(err, RawmError::UnsupportedFormat(_)));
    }

    #[test]
    fn legacy_image_data_format_is_mono8_only() {
        let ok = with_header(
            "<width>2</width><height>2</height><image_data_format>MONO8</image_data_format>",
        );
        assert_eq!(
            MovieMetadata::parse(&ok).unwrap().pixel_format,
            PixelFormat::Mono8
        );
        let bad = with_header(
            "<width>2</width><height>2</height><image_data_format>RGB24</image_data_format>",
        );
        assert!(matches!(
            MovieMetadata::parse(&bad).unwrap_err(),
            RawmError::UnsupportedFormat(_)
        ));
    }

    #[test]
    fn unreadable_framerate_is_dropped() {
        let m = MovieMetadata::parse(&with_header(
            "<width>2</width><height>2</height><framerate>fast</framerate>",
        ))
        .unwrap();
        assert_eq!(m.framerate, None);
    }

    #[test]
    fn frames_need_timestamps_and_at_least_one_record() {
        let no_ts = "<movie_metadata><header><width>1</width><height>1</height></header>\
                     <frames><frame frame=\"0\"/></frames></movie_metadata>";
        assert!(matches!(
            MovieMetadata::parse(no_ts).unwrap_err(),
            RawmError::MalformedMetadata(_)
        ));

        let empty = "<movie_metadata><header><width>1</width><height>1</height></header>\
                     <frames></frames></movie_metadata>";
        assert!(matches!(
            MovieMetadata::parse(empty).unwrap_err(),
            RawmError::MalformedMetadata(_)
        ));
    }

    #[test]
    fn frame_index_defaults_to_position() {
        let doc = "<movie_metadata><header><width>1</width><height>1</height></header>\
                   <frames><frame timestamp=\"7\"/><frame timestamp=\"8\"></frame></frames>\
                   </movie_metadata>";
        let m = MovieMetadata::parse(doc).unwrap();
        assert_eq!(
            m.frames,
            vec![
                FrameRecord { index: 0, timestamp: 7 },
                FrameRecord { index: 1, timestamp: 8 }
            ]
        );
    }

    #[test]
    fn provenance_strings_are_escaped() {
        let mut m = MovieMetadata::new(1, 1, PixelFormat::Mono8).with_dense_frames(1);
        m.app_name = "a&b \"lab\"".to_string();
        let again = MovieMetadata::parse(&m.to_xml()).unwrap();
        assert_eq!(again.app_name, "a&b \"lab\"");
    }

    #[test]
    fn decode_samples_honors_byte_order() {
        let mut m = MovieMetadata::new(2, 1, PixelFormat::Mono12).with_dense_frames(1);
        m.endianness = "little".to_string();
        assert_eq!(m.decode_samples(&[0x34, 0x12, 0xff, 0x0f]).unwrap(), vec![0x1234, 0x0fff]);
        m.endianness = "big".to_string();
        assert_eq!(m.decode_samples(&[0x12, 0x34, 0x0f, 0xff]).unwrap(), vec![0x1234, 0x0fff]);
        m.endianness = "middle".to_string();
        assert!(m.decode_samples(&[0, 0, 0, 0]).is_err());
        assert!(m.decode_samples(&[0, 0]).is_err());
    }

    #[test]
    fn oversized_frames_are_malformed() {
        let doc = with_header(
            "<width>4294967295</width><height>4294967295</height>\
             <pixel_format>Mono16</pixel_format>",
        );
        let err = MovieMetadata::parse(&doc).unwrap_err();
        assert!(err.to_string().contains("frame size overflows"), "{err}");

        let four_frames = "<movie_metadata><header><width>4294967295</width>\
             <height>2147483648</height><pixel_format>Mono8</pixel_format></header><frames>\
             <frame timestamp=\"0\"/><frame timestamp=\"1\"/>\
             <frame timestamp=\"2\"/><frame timestamp=\"3\"/></frames></movie_metadata>";
        let err = MovieMetadata::parse(four_frames).unwrap_err();
        assert!(matches!(err, RawmError::MalformedMetadata(_)));
    }

    #[test]
    fn repeated_header_field_is_malformed() {
        let err = MovieMetadata::parse(&with_header(
            "<width>4</width><width>2</width><height>3</height>",
        ))
        .unwrap_err();
        assert!(matches!(err, RawmError::MalformedMetadata(_)));
        assert!(err.to_string().contains("'width'"), "{err}");
    }
}
