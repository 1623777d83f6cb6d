// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use phylowood::config::{
    check_samplesheet, load_and_validate_config, EngineKind, RunOverrides, RuntimeBuilder,
};
use phylowood::engine::summary::EXIT_EXECUTION_FAILURE;
use phylowood::errors::RunError;
use phylowood::observability::messages::engine::RunCancelled;
use phylowood::observability::messages::validation::SamplesheetChecked;
use phylowood::observability::messages::StructuredLog;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Alignment and tree inference pipelines over containerized tools.
#[derive(Parser)]
#[command(name = "phylowood", version, about)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "PHYLOWOOD_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a pipeline definition
    Run(RunArgs),
    /// Check a samplesheet and write its normalized form
    CheckSamplesheet {
        input: PathBuf,
        output: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Pipeline definition (YAML)
    pipeline: PathBuf,

    /// Maximum number of tasks running at once
    #[arg(long, env = "PHYLOWOOD_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Named run profile from the pipeline definition
    #[arg(long, env = "PHYLOWOOD_PROFILE")]
    profile: Option<String>,

    /// Container engine: local, docker or singularity
    #[arg(long, env = "PHYLOWOOD_ENGINE")]
    engine: Option<EngineKind>,

    /// Reuse work directories of tasks that already finished
    #[arg(long, env = "PHYLOWOOD_RESUME")]
    resume: bool,

    /// Root of the per-task work directories
    #[arg(long, env = "PHYLOWOOD_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Also write the run summary as JSON
    #[arg(long, env = "PHYLOWOOD_SUMMARY_JSON")]
    summary_json: Option<PathBuf>,
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.log_json) {
        eprintln!("{:#}", e);
        return ExitCode::from(EXIT_EXECUTION_FAILURE as u8);
    }

    let code = match cli.command {
        Command::Run(args) => match run(args).await {
            Ok(code) => code,
            Err(e) => {
                tracing::error!("{}", e);
                e.exit_code()
            }
        },
        Command::CheckSamplesheet { input, output } => match check(input, output) {
            Ok(()) => 0,
            Err(e) => {
                tracing::error!("{:#}", e);
                EXIT_EXECUTION_FAILURE
            }
        },
    };
    ExitCode::from(code as u8)
}

async fn run(args: RunArgs) -> Result<i32, RunError> {
    let mut config = load_and_validate_config(&args.pipeline)?;
    config.apply_overrides(&RunOverrides {
        profile: args.profile,
        engine: args.engine,
        concurrency: args.concurrency,
        work_dir: args.work_dir,
    })?;

    let runtime = RuntimeBuilder::from_config(&config, args.resume)?;
    runtime.prepare_work_dir(args.resume)?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    let pipeline = runtime.plan.name().to_string();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            RunCancelled {
                pipeline: &pipeline,
                reason: "interrupted",
            }
            .log();
            interrupt.cancel();
        }
    });

    let summary = runtime.run(cancel).await;

    runtime.write_software_versions(&summary)?;
    if let Some(path) = &args.summary_json {
        std::fs::write(path, summary.to_json()?).map_err(RunError::Summary)?;
    }
    println!("{}", summary.render_table());

    Ok(summary.exit_code())
}

fn check(input: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    let sheet = check_samplesheet(&input, &output)
        .with_context(|| format!("samplesheet {}", input.display()))?;
    SamplesheetChecked {
        sample_count: sheet.len(),
        output: &output,
    }
    .log();
    Ok(())
}
