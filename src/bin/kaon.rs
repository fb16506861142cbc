//! kaon CLI - YAML API test-suite execution tool.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use kaon::{
    library, ExecutorCatalog, SuiteReport, SuiteRunner,
    DEFAULT_MAX_INVOKE_DEPTH,
};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::process::exit;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// kaon - YAML-based API test-suite runner with executor libraries.
#[derive(Parser, Debug)]
#[command(name = "kaon", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a test file, or every test file under a directory.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Test file or directory path (absolute, or relative to the
    /// working directory).
    #[arg(short = 'p', long = "path")]
    path: PathBuf,

    /// Directory containing executor library files.
    #[arg(short = 'l', long = "lib-dir")]
    lib_dir: PathBuf,

    /// Global variable override, repeatable (key=value). Seeded
    /// before setup runs.
    #[arg(long = "var", value_parser = parse_key_val)]
    vars: Vec<(String, String)>,

    /// Maximum nested executor invocation depth.
    #[arg(long = "max-depth", default_value_t = DEFAULT_MAX_INVOKE_DEPTH)]
    max_depth: usize,

    /// Write the full run report as JSON to this file.
    #[arg(long = "report-json")]
    report_json: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty variable name in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn init_tracing(verbose: bool) {
    if std::env::var_os("RUST_LOG").is_none() {
        let level = if verbose { "debug" } else { "info" };
        std::env::set_var("RUST_LOG", level);
    }

    if tracing::dispatcher::has_been_set() {
        return;
    }

    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
}

fn print_suite_report(report: &SuiteReport) {
    let status = if report.success() {
        "\x1b[32mPASS\x1b[0m"
    } else {
        "\x1b[31mFAIL\x1b[0m"
    };
    info!(
        "{} suite: {} ({} ms)",
        status, report.name, report.duration_ms
    );

    if let Some(err) = &report.error {
        error!("  \x1b[31m{}\x1b[0m", err);
    }

    for (i, case) in report.cases.iter().enumerate() {
        let case_status = if case.success {
            "\x1b[32m✓\x1b[0m"
        } else {
            "\x1b[31m✗\x1b[0m"
        };
        info!(
            "  {}. {} {} ({} ms)",
            i + 1,
            case_status,
            case.name,
            case.duration_ms
        );
        if let Some(err) = &case.error {
            error!("     \x1b[31mError: {}\x1b[0m", err);
        }
    }
}

fn save_json_report(
    reports: &[SuiteReport],
    path: &PathBuf,
) -> Result<()> {
    let content = serde_json::to_string_pretty(reports)?;
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

async fn run_tests(args: &RunArgs) -> Result<Vec<SuiteReport>> {
    let test_files = library::collect_test_files(&args.path)?;
    let library_files = library::collect_library_files(&args.lib_dir)?;
    let executors = library::load_library(&library_files)?;

    let runner = SuiteRunner::new(ExecutorCatalog::new(executors))
        .with_max_invoke_depth(args.max_depth);

    let overrides: HashMap<String, String> =
        args.vars.iter().cloned().collect();

    info!("Running {} test file(s)...", test_files.len());
    runner.run_files(&test_files, &overrides).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => {
            init_tracing(args.verbose);

            let reports = run_tests(&args).await?;

            let mut passed = 0;
            let mut failed = 0;
            for report in &reports {
                print_suite_report(report);
                if report.success() {
                    passed += 1;
                } else {
                    failed += 1;
                }
            }
            info!(
                "Summary:\n  Total: {}\n  \x1b[32mPassed: {}\x1b[0m\n  \x1b[31mFailed: {}\x1b[0m",
                passed + failed,
                passed,
                failed
            );

            if let Some(path) = &args.report_json {
                save_json_report(&reports, path)?;
                info!("Report saved: {}", path.display());
            }

            if failed > 0 {
                exit(1);
            }
        }
    }

    Ok(())
}
