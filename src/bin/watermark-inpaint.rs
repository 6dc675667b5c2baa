use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};

use watermark_inpaint::{
    default_output_path, logger, Algorithm, ProcessOptions, ProcessResult, WatermarkEngine,
};

#[derive(Clone, Copy, ValueEnum)]
enum AlgorithmArg {
    /// Fast marching (quick, thin marks)
    FastMarching,
    /// Anisotropic diffusion (slower, larger structures)
    Diffusion,
    /// Average of fast marching and diffusion
    Blend,
    /// Three fast-marching passes with a wider radius
    Enhanced,
}

impl From<AlgorithmArg> for Algorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::FastMarching => Algorithm::FastMarching,
            AlgorithmArg::Diffusion => Algorithm::AnisotropicDiffusion,
            AlgorithmArg::Blend => Algorithm::Blend,
            AlgorithmArg::Enhanced => Algorithm::MultiPassEnhanced,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "watermark-inpaint",
    about = "Detect watermark regions and reconstruct them by inpainting",
    version,
    after_help = "Simple usage: watermark-inpaint <image>  (auto-detect, writes {name}_no_watermark.{ext})\n\n\
                  Masks are grayscale images where white (>= 128) marks the region to reconstruct."
)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Input image file or directory
    input: String,

    /// Output file or directory (default: {name}_no_watermark.{ext})
    #[arg(short, long)]
    output: Option<String>,

    /// Mask image for a single input (skips automatic detection)
    #[arg(short, long)]
    mask: Option<String>,

    /// Directory of {stem}_mask{ext} files for batch input
    #[arg(long)]
    mask_dir: Option<String>,

    /// Descend into subdirectories in batch mode
    #[arg(short, long)]
    recursive: bool,

    /// Inpainting algorithm
    #[arg(short, long, value_enum, default_value = "blend")]
    algorithm: AlgorithmArg,

    /// Do not grow the detected mask over soft edges
    #[arg(long)]
    no_aggressive: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.quiet {
        "warn"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    logger::init(level);

    let opts = ProcessOptions {
        algorithm: cli.algorithm.into(),
        aggressive: !cli.no_aggressive,
        ..ProcessOptions::default()
    };
    let engine = WatermarkEngine::new(opts);

    let input_path = Path::new(&cli.input);
    if !input_path.exists() {
        error!("Input path does not exist: {}", cli.input);
        process::exit(1);
    }

    info!(
        algorithm = %engine.options().algorithm,
        aggressive = engine.options().aggressive,
        "starting"
    );

    let results = if input_path.is_dir() {
        if cli.mask.is_some() {
            warn!("--mask is ignored for directories; use --mask-dir");
        }
        let output_dir = if let Some(o) = &cli.output {
            PathBuf::from(o)
        } else {
            error!("Output directory is required for batch processing");
            eprintln!("Usage: watermark-inpaint <input_dir> -o <output_dir>");
            process::exit(1);
        };
        let mask_dir = cli.mask_dir.as_deref().map(Path::new);
        engine.process_directory(input_path, &output_dir, mask_dir, cli.recursive)
    } else {
        let output_path = match &cli.output {
            Some(o) => PathBuf::from(o),
            None => default_output_path(input_path),
        };
        let mask = cli.mask.as_deref().map(Path::new);
        vec![engine.process_file(input_path, &output_path, mask)]
    };

    let mut success_count = 0u32;
    let mut skip_count = 0u32;
    let mut fail_count = 0u32;

    for r in &results {
        print_result(r, cli.quiet);
        if !r.success {
            fail_count += 1;
        } else if r.skipped {
            skip_count += 1;
        } else {
            success_count += 1;
        }
    }

    if results.len() > 1 && !cli.quiet {
        eprintln!();
        eprint!("[Summary] Processed: {success_count}");
        if skip_count > 0 {
            eprint!(", Unchanged: {skip_count}");
        }
        if fail_count > 0 {
            eprint!(", Failed: {fail_count}");
        }
        eprintln!(" (Total: {})", results.len());
    }

    if fail_count > 0 {
        process::exit(1);
    }
}

fn print_result(result: &ProcessResult, quiet: bool) {
    if quiet && result.success {
        return;
    }

    let filename = result.path.file_name().map_or_else(
        || result.path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    );

    if !result.success {
        eprintln!("[FAIL] {filename}: {}", result.message);
    } else if result.skipped {
        eprintln!("[SKIP] {filename}: {}", result.message);
    } else {
        eprintln!("[OK] {filename}: {}", result.message);
    }
}
