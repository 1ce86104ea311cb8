use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use rawmovie::{
    AlterOpts, ExtractOpts, ImageKind, IngestOpts, Movie, MoviePaths, PixelFormat,
    paths::has_rawm_ext,
};

#[derive(Parser, Debug)]
#[command(
    name = "rawmovie",
    version,
    about = "Convert image folders to raw/rawm movies and derive trimmed movies from them"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build `<FOLDER>.raw` and `<FOLDER>.rawm` from each folder of grayscale images.
    Ingest(IngestArgs),
    /// Write a new movie holding a trimmed, strided selection of frames.
    Alter(AlterArgs),
    /// Validate a movie and print its header.
    Info(InfoArgs),
    /// Export every frame of a movie as an image file.
    Extract(ExtractArgs),
    /// Write `<FOLDER>.xiseq` descriptors that reference each folder's images.
    Xiseq(XiseqArgs),
}

#[derive(Parser, Debug)]
struct IngestArgs {
    /// Pixel format of the images (mono8, mono10, mono12, mono14, mono16).
    #[arg(long)]
    pixel_format: PixelFormat,

    /// Frame rate to record in the metadata.
    #[arg(long)]
    framerate: Option<f64>,

    /// Image folders; each becomes one movie next to it.
    #[arg(required = true)]
    folders: Vec<PathBuf>,
}

#[derive(Parser, Debug)]
struct AlterArgs {
    /// Input .rawm file.
    input: PathBuf,

    /// Output .rawm file (default: `<INPUT>_out.rawm`).
    output: Option<PathBuf>,

    /// First frame to keep (1-based).
    #[arg(long, default_value_t = 1)]
    begin: u64,

    /// Last frame to keep (1-based, inclusive; default: last frame).
    #[arg(long)]
    end: Option<u64>,

    /// Keep every STEP-th frame from BEGIN.
    #[arg(long, default_value_t = 1)]
    step: u64,
}

#[derive(Parser, Debug)]
struct InfoArgs {
    /// Input .rawm file.
    input: PathBuf,

    /// Print the full metadata (including frame records) as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct ExtractArgs {
    /// Input .rawm file.
    input: PathBuf,

    /// Output directory (default: `<INPUT>_frames`).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Image format to write.
    #[arg(long, value_enum, default_value_t = ImageChoice::Tiff)]
    format: ImageChoice,
}

#[derive(Parser, Debug)]
struct XiseqArgs {
    /// Pixel format recorded in the descriptor.
    #[arg(long)]
    pixel_format: PixelFormat,

    #[arg(required = true)]
    folders: Vec<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ImageChoice {
    Tiff,
    Png,
}

impl From<ImageChoice> for ImageKind {
    fn from(c: ImageChoice) -> Self {
        match c {
            ImageChoice::Tiff => ImageKind::Tiff,
            ImageChoice::Png => ImageKind::Png,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Ingest(args) => cmd_ingest(args),
        Command::Alter(args) => cmd_alter(args),
        Command::Info(args) => cmd_info(args),
        Command::Extract(args) => cmd_extract(args),
        Command::Xiseq(args) => cmd_xiseq(args),
    }
}

fn open_movie(input: &Path) -> anyhow::Result<Movie> {
    if !has_rawm_ext(input) {
        anyhow::bail!("input file extension must be '.rawm': '{}'", input.display());
    }
    Movie::open(input).with_context(|| format!("open movie '{}'", input.display()))
}

fn cmd_ingest(args: IngestArgs) -> anyhow::Result<()> {
    let opts = IngestOpts {
        pixel_format: args.pixel_format,
        framerate: args.framerate,
    };
    opts.validate()?;

    for folder in &args.folders {
        if !folder.is_dir() {
            tracing::warn!(path = %folder.display(), "not a directory, skipping");
            eprintln!("warning: not a directory: {}", folder.display());
            continue;
        }
        MoviePaths::for_folder(folder).ensure_absent()?;
        let summary = rawmovie::ingest_folder(folder, &opts)
            .with_context(|| format!("ingest '{}'", folder.display()))?;
        eprintln!(
            "wrote {} ({} frames, {}x{} {})",
            summary.output.rawm.display(),
            summary.frames,
            summary.width,
            summary.height,
            summary.pixel_format
        );
    }
    Ok(())
}

fn cmd_alter(args: AlterArgs) -> anyhow::Result<()> {
    let src = open_movie(&args.input)?;

    let dst = match &args.output {
        Some(out) => {
            if !has_rawm_ext(out) {
                anyhow::bail!("output file extension must be '.rawm': '{}'", out.display());
            }
            MoviePaths::from_rawm(out)?
        }
        None => src.paths().with_suffix("_out"),
    };

    let opts = AlterOpts {
        begin: args.begin,
        end: args.end,
        step: args.step,
    };
    // Report bad parameters before touching the filesystem.
    opts.resolve(src.n_frames())?;
    dst.ensure_absent()?;

    let summary = rawmovie::alter_movie(&src, &dst, &opts)?;
    eprintln!(
        "wrote {} ({} of {} frames)",
        summary.output.rawm.display(),
        summary.frames_written,
        summary.source_frames
    );
    Ok(())
}

fn cmd_info(args: InfoArgs) -> anyhow::Result<()> {
    let movie = open_movie(&args.input)?;
    let meta = movie.metadata();

    if args.json {
        let out = serde_json::to_string_pretty(meta).context("serialize metadata")?;
        println!("{out}");
        return Ok(());
    }

    println!("file:         {}", movie.paths().rawm.display());
    println!("app:          {} {}", meta.app_name, meta.version);
    println!("size:         {}x{}", meta.width, meta.height);
    println!(
        "pixel_format: {} ({} bit, {} byte/px)",
        meta.pixel_format,
        meta.pixel_format.bit_depth(),
        meta.pixel_format.bytes_per_pixel()
    );
    println!("endianness:   {}", meta.endianness);
    match meta.framerate {
        Some(fr) => println!("framerate:    {fr}"),
        None => println!("framerate:    -"),
    }
    println!("frames:       {}", meta.n_frames());
    println!("frame_size:   {} bytes", meta.frame_size());
    Ok(())
}

fn cmd_extract(args: ExtractArgs) -> anyhow::Result<()> {
    let movie = open_movie(&args.input)?;
    let out_dir = args.out.unwrap_or_else(|| {
        let mut base = movie.paths().base().into_os_string();
        base.push("_frames");
        PathBuf::from(base)
    });

    let mut opts = ExtractOpts::new(&out_dir);
    opts.kind = args.format.into();
    let written = rawmovie::extract_frames(&movie, &opts)?;

    eprintln!("wrote {} frames to {}", written.len(), out_dir.display());
    Ok(())
}

fn cmd_xiseq(args: XiseqArgs) -> anyhow::Result<()> {
    for folder in &args.folders {
        if !folder.is_dir() {
            tracing::warn!(path = %folder.display(), "not a directory, skipping");
            eprintln!("warning: not a directory: {}", folder.display());
            continue;
        }
        let out = rawmovie::write_xiseq(folder, args.pixel_format)
            .with_context(|| format!("write descriptor for '{}'", folder.display()))?;
        eprintln!("wrote {}", out.display());
    }
    Ok(())
}
