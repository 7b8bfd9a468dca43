use anyhow::Result;
use appatch::{apply_patch, ApplyOptions};
use clap::Parser;
use colored::Colorize;
use env_logger::Builder;
use log::{info, Level, LevelFilter};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Apply an AI-friendly patch file to a project directory.",
    long_about = "Applies structured, snippet-located edits (anchors + snippets, tolerant of \
indentation and blank-line drift) described by an AP 3.0 patch file to a project directory."
)]
struct Args {
    /// Path to the AP 3.0 patch file.
    patch_file: PathBuf,

    /// Path to the project directory the patch is applied against.
    project_dir: PathBuf,

    #[arg(short = 'n', long, help = "Show what would be done, but don't modify any file.")]
    dry_run: bool,

    #[arg(long, help = "Apply whatever modifications can be located per file instead of requiring the whole patch to succeed.")]
    force: bool,

    #[arg(long, help = "Render the report as JSON instead of human-readable text.")]
    json_report: bool,

    #[arg(long, help = "Where to write the force-mode replay patch. Defaults to <project-dir>/afailed.ap.")]
    failure_report: Option<PathBuf>,

    #[arg(long, help = "Also dump a standalone single-modification patch per failure, for building a minimal repro.")]
    create_failure_case: bool,

    /// Increase logging verbosity. Can be used multiple times (e.g., -v, -vv).
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        long_help = "Increase logging verbosity.\n-v for info, -vv for debug, -vvv for trace.\nBy default, only warnings and errors are shown."
    )]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| match record.level() {
            Level::Error => writeln!(buf, "{} {}", "error:".red().bold(), record.args()),
            Level::Warn => writeln!(buf, "{} {}", "warning:".yellow().bold(), record.args()),
            Level::Info => writeln!(buf, "{}", record.args()),
            Level::Debug => writeln!(buf, "{} {}", "debug:".blue().bold(), record.args()),
            Level::Trace => writeln!(buf, "{} {}", "trace:".cyan().bold(), record.args()),
        })
        .init();

    if !args.project_dir.is_dir() {
        anyhow::bail!("Project directory '{}' not found or is not a directory.", args.project_dir.display());
    }
    if !args.patch_file.is_file() {
        anyhow::bail!("Patch file '{}' not found or is not a file.", args.patch_file.display());
    }

    let options = ApplyOptions {
        dry_run: args.dry_run,
        json_report: args.json_report,
        debug: log_level >= LevelFilter::Debug,
        force: args.force,
        failure_report_path: args.failure_report,
        create_failure_case: args.create_failure_case,
    };

    info!("applying {} to {}", args.patch_file.display(), args.project_dir.display());
    let report = apply_patch(&args.patch_file, &args.project_dir, &options);

    if options.json_report {
        println!("{}", report.to_json());
    } else {
        print!("{report}");
    }

    if !report.is_success() {
        std::process::exit(1);
    }

    Ok(())
}
