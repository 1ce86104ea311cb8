use std::{
    cmp::Ordering,
    path::{Path, PathBuf},
};

use anyhow::Context as _;

use crate::error::RawmResult;

pub const IMAGE_EXTENSIONS: [&str; 6] = ["bmp", "tiff", "tif", "png", "jpg", "jpeg"];

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e))
}

/// Image files directly inside `folder`, in natural order (`img2.png` before `img10.png`).
pub fn list_images(folder: &Path) -> RawmResult<Vec<PathBuf>> {
    let mut out = Vec::new();
    let entries =
        std::fs::read_dir(folder).with_context(|| format!("list '{}'", folder.display()))?;
    for entry in entries {
        let p = entry
            .with_context(|| format!("list '{}'", folder.display()))?
            .path();
        if p.is_file() && is_image_file(&p) {
            out.push(p);
        }
    }
    out.sort_by(|a, b| natural_cmp(&file_name_lossy(a), &file_name_lossy(b)));
    Ok(out)
}

fn file_name_lossy(p: &Path) -> String {
    p.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Compare strings treating runs of ASCII digits as numbers.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = Chunks(a);
    let mut b = Chunks(b);
    loop {
        match (a.next(), b.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (is_digits(x), is_digits(y)) {
                    (true, true) => cmp_numeric(x, y),
                    _ => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn is_digits(s: &str) -> bool {
    s.as_bytes().first().is_some_and(u8::is_ascii_digit)
}

// Digit runs of any length: strip leading zeros, then longer is larger. Ties on value are
// broken by the zero padding so "01" and "1" still order deterministically.
fn cmp_numeric(x: &str, y: &str) -> Ordering {
    let xt = x.trim_start_matches('0');
    let yt = y.trim_start_matches('0');
    xt.len()
        .cmp(&yt.len())
        .then_with(|| xt.cmp(yt))
        .then_with(|| x.len().cmp(&y.len()))
}

struct Chunks<'a>(&'a str);

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let first = self.0.as_bytes().first()?;
        let digit = first.is_ascii_digit();
        let end = self
            .0
            .bytes()
            .position(|b| b.is_ascii_digit() != digit)
            .unwrap_or(self.0.len());
        let (head, tail) = self.0.split_at(end);
        self.0 = tail;
        Some(head)
    }
}
