use std::{fmt, str::FromStr};

use crate::error::{RawmError, RawmResult};

/// Grayscale pixel encodings a movie can store.
///
/// Names follow the AIA pixel format naming convention (`Mono8`, `Mono12`, ...).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum PixelFormat {
    #[default]
    Mono8,
    Mono10,
    Mono12,
    Mono14,
    Mono16,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 5] = [
        PixelFormat::Mono8,
        PixelFormat::Mono10,
        PixelFormat::Mono12,
        PixelFormat::Mono14,
        PixelFormat::Mono16,
    ];

    /// Storage width of one pixel in the raw stream.
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Mono8 => 1,
            PixelFormat::Mono10
            | PixelFormat::Mono12
            | PixelFormat::Mono14
            | PixelFormat::Mono16 => 2,
        }
    }

    /// Number of significant bits per sample.
    pub const fn bit_depth(self) -> u32 {
        match self {
            PixelFormat::Mono8 => 8,
            PixelFormat::Mono10 => 10,
            PixelFormat::Mono12 => 12,
            PixelFormat::Mono14 => 14,
            PixelFormat::Mono16 => 16,
        }
    }

    /// Numeric tag used by the xiseq descriptor (`xiApiImg:format=`).
    pub const fn api_tag(self) -> u32 {
        match self {
            PixelFormat::Mono8 => 0x0108_0001,
            PixelFormat::Mono10 => 0x0110_0003,
            PixelFormat::Mono12 => 0x0110_0005,
            PixelFormat::Mono14 => 0x0110_0025,
            PixelFormat::Mono16 => 0x0110_0007,
        }
    }

    pub fn from_api_tag(tag: u32) -> RawmResult<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.api_tag() == tag)
            .ok_or_else(|| RawmError::unsupported_format(format!("{tag:#010x}")))
    }

    /// Capitalized name, as written in the metadata sidecar.
    pub const fn name(self) -> &'static str {
        match self {
            PixelFormat::Mono8 => "Mono8",
            PixelFormat::Mono10 => "Mono10",
            PixelFormat::Mono12 => "Mono12",
            PixelFormat::Mono14 => "Mono14",
            PixelFormat::Mono16 => "Mono16",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = RawmError;

    // Case-insensitive: front ends accept "mono12" as well as "Mono12".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| RawmError::unsupported_format(trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_width_is_one_byte_only_for_mono8() {
        assert_eq!(PixelFormat::Mono8.bytes_per_pixel(), 1);
        for f in &PixelFormat::ALL[1..] {
            assert_eq!(f.bytes_per_pixel(), 2, "{f}");
        }
    }

    #[test]
    fn parse_accepts_any_case_and_rejects_unknown() {
        assert_eq!("Mono12".parse::<PixelFormat>().unwrap(), PixelFormat::Mono12);
        assert_eq!("mono16".parse::<PixelFormat>().unwrap(), PixelFormat::Mono16);
        assert_eq!(" MONO8\n".parse::<PixelFormat>().unwrap(), PixelFormat::Mono8);

        let err = "Mono9".parse::<PixelFormat>().unwrap_err();
        assert!(matches!(err, RawmError::UnsupportedFormat(ref n) if n == "Mono9"));
        assert!("RGB8".parse::<PixelFormat>().is_err());
    }

    #[test]
    fn api_tags_are_distinct_and_reversible() {
        for f in PixelFormat::ALL {
            assert_eq!(PixelFormat::from_api_tag(f.api_tag()).unwrap(), f);
        }
        assert_eq!(PixelFormat::Mono14.api_tag(), 17_825_829);
        assert!(PixelFormat::from_api_tag(0).is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for f in PixelFormat::ALL {
            assert_eq!(f.to_string().parse::<PixelFormat>().unwrap(), f);
            assert!(f.bit_depth() <= 8 * f.bytes_per_pixel());
        }
    }
}
