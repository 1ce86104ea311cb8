use std::path::PathBuf;

use rawmovie::{
    ExtractOpts, ImageKind, IngestOpts, Movie, MovieMetadata, MoviePaths, PixelFormat, RawmError,
    extract_frames, ingest_folder,
};

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "rawmovie_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn extracted_frames_reingest_to_the_same_stream() {
    let tmp = temp_dir("extract_roundtrip");
    let paths = MoviePaths::from_base(tmp.join("src"));
    let meta = MovieMetadata::new(3, 2, PixelFormat::Mono8).with_dense_frames(2);
    let raw: Vec<u8> = (0u8..12).collect();
    std::fs::write(&paths.raw, &raw).unwrap();
    meta.write_to(&paths.rawm).unwrap();

    let movie = Movie::open(&paths.rawm).unwrap();
    let folder = tmp.join("frames");
    let mut opts = ExtractOpts::new(&folder);
    opts.kind = ImageKind::Png;
    let written = extract_frames(&movie, &opts).unwrap();
    assert_eq!(
        written,
        vec![folder.join("frame_00000.png"), folder.join("frame_00001.png")]
    );

    let summary = ingest_folder(&folder, &IngestOpts::new(PixelFormat::Mono8)).unwrap();
    assert_eq!(std::fs::read(&summary.output.raw).unwrap(), raw);

    let err = extract_frames(&movie, &opts).unwrap_err();
    assert!(matches!(err, RawmError::OutputExists(_)));

    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn sixteen_bit_frames_are_written_as_tiff() {
    let tmp = temp_dir("extract_tiff");
    let paths = MoviePaths::from_base(tmp.join("deep"));
    let meta = MovieMetadata::new(2, 1, PixelFormat::Mono16).with_dense_frames(1);
    let samples = [0x1234u16, 0xfedc];
    let raw: Vec<u8> = if meta.endianness == "big" {
        samples.iter().flat_map(|s| s.to_be_bytes()).collect()
    } else {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    };
    std::fs::write(&paths.raw, &raw).unwrap();
    meta.write_to(&paths.rawm).unwrap();

    let movie = Movie::open(&paths.rawm).unwrap();
    let written = extract_frames(&movie, &ExtractOpts::new(tmp.join("out"))).unwrap();
    assert_eq!(written.len(), 1);

    let img = image::open(&written[0]).unwrap().into_luma16();
    assert_eq!(img.into_raw(), samples.to_vec());

    std::fs::remove_dir_all(&tmp).ok();
}
