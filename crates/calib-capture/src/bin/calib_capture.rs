//! calib-capture CLI: inspect and package calibration session results.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

#[cfg(not(feature = "tracing"))]
use calib_capture::core::init_with_level;
use calib_capture::core::{CalibrationHandoff, CalibrationResult, Thumbnail};
use calib_capture::export::{write_archive, write_transcript};
use calib_capture::SessionConfig;
use clap::{Parser, Subcommand};
#[cfg(not(feature = "tracing"))]
use log::LevelFilter;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "calib-capture")]
#[command(about = "Inspect and package camera calibration session results")]
#[command(version)]
struct Cli {
    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines through `tracing`.
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the text transcript of a JSON calibration result.
    Summary {
        /// Path to a `results.json` file.
        results: PathBuf,
    },

    /// Bundle a JSON result and its sample images into a zip archive.
    Package {
        /// Path to a `results.json` file.
        results: PathBuf,

        /// Directory with one PNG per sample, ordered by the number in the file name.
        #[arg(long)]
        samples: PathBuf,

        /// Output archive path.
        #[arg(long)]
        out: PathBuf,
    },

    /// Write the default session configuration as JSON.
    Config {
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    let result = match cli.command {
        Commands::Summary { results } => run_summary(&results),
        Commands::Package {
            results,
            samples,
            out,
        } => run_package(&results, &samples, &out),
        Commands::Config { out } => run_config(&out),
    };
    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

#[cfg(not(feature = "tracing"))]
fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(err) = init_with_level(level) {
        eprintln!("warning: logger already installed: {err}");
    }
}

#[cfg(feature = "tracing")]
fn init_logging(cli: &Cli) {
    if cli.verbose && std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "debug");
    }
    calib_capture::core::init_tracing(cli.log_json);
}

fn load_result(path: &Path) -> CliResult<CalibrationResult> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn run_summary(results: &Path) -> CliResult<()> {
    let result = load_result(results)?;
    print!("{}", write_transcript(&result));
    Ok(())
}

fn run_package(results: &Path, samples: &Path, out: &Path) -> CliResult<()> {
    let result = load_result(results)?;
    let pngs = sample_pngs(samples)?;
    result.check_against(pngs.len())?;

    let thumbnails = pngs
        .iter()
        .map(|path| -> CliResult<Thumbnail> { Ok(Thumbnail::from_png(fs::read(path)?)?) })
        .collect::<CliResult<Vec<_>>>()?;
    let handoff = CalibrationHandoff { result, thumbnails };

    let file = BufWriter::new(File::create(out)?);
    write_archive(file, &handoff)?;
    log::info!(
        "packaged {} samples into {}",
        handoff.sample_count(),
        out.display()
    );
    Ok(())
}

fn run_config(out: &Path) -> CliResult<()> {
    SessionConfig::default().write_json(out)?;
    log::info!("wrote default config to {}", out.display());
    Ok(())
}

/// PNG files of `dir` ordered by the trailing number of their stem.
fn sample_pngs(dir: &Path) -> CliResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_png = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("png"));
        if path.is_file() && is_png {
            files.push(path);
        }
    }
    files.sort_by_key(|p| (trailing_number(p), p.clone()));
    Ok(files)
}

fn trailing_number(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    let digits: String = stem
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().ok()
}
