//! `sandcoder` command line.

use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sandcoder::config::AgentConfig;
use sandcoder::memory::MemoryStorage;
use sandcoder::sandbox::{ContainerSetupInfo, SandboxExecutor, install_exit_hook};
use sandcoder::tools::{ProjectType, ValidationRunner};

#[derive(Parser, Debug)]
#[command(name = "sandcoder", version, about = "Sandboxed coding agent tools")]
struct Cli {
    /// Project directory mounted into the sandbox
    #[arg(long, global = true, default_value = ".")]
    workspace: PathBuf,

    /// Container image
    #[arg(long, global = true)]
    image: Option<String>,

    /// Memory document path (default: ~/.sandcoder/memory/<workspace>.md)
    #[arg(long, global = true)]
    memory: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Provision the sandbox and print what it looks like from inside
    Verify,

    /// Run one validated command in the sandbox
    Exec {
        /// Shell command
        command: String,
    },

    /// Detect the project type and run its checks
    Validate {
        /// Skip detection (node, python, rust, go, unknown)
        #[arg(long)]
        project_type: Option<ProjectType>,
    },

    /// Inspect the persisted memory document
    Memory {
        #[command(subcommand)]
        command: MemoryCommand,
    },
}

#[derive(Subcommand, Debug)]
enum MemoryCommand {
    /// Print the document
    Show,
    /// Print its word count
    Words,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let workspace = cli
        .workspace
        .canonicalize()
        .with_context(|| format!("workspace {} not found", cli.workspace.display()))?;
    let mut config = AgentConfig::new(&workspace);
    if let Some(image) = cli.image {
        config.sandbox = config.sandbox.with_image(image);
    }
    if let Some(memory) = cli.memory {
        config.memory_path = memory;
    }
    config.validate()?;

    match cli.command {
        Command::Verify => {
            with_sandbox(&config, |_, info| async move {
                println!("{}", info);
                Ok(ExitCode::SUCCESS)
            })
            .await
        }
        Command::Exec { command } => {
            with_sandbox(&config, |executor, _| async move {
                let result = executor.execute_bash(&command).await;
                if !result.output.is_empty() {
                    println!("{}", result.output);
                }
                match result.error {
                    Some(error) => {
                        eprintln!("{}", error);
                        Ok(ExitCode::FAILURE)
                    }
                    None => Ok(ExitCode::SUCCESS),
                }
            })
            .await
        }
        Command::Validate { project_type } => {
            with_sandbox(&config, |executor, _| async move {
                let report = ValidationRunner::new()
                    .run_validation(&executor, project_type)
                    .await;
                println!("{}", report.summary);
                Ok(if report.overall_pass {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                })
            })
            .await
        }
        Command::Memory { command } => {
            let storage = MemoryStorage::new(&config.memory_path);
            let memory = storage.read()?;
            match command {
                MemoryCommand::Show if memory.is_empty() => {
                    println!("No memory at {}", storage.path().display())
                }
                MemoryCommand::Show => print!("{}", memory.to_markdown()),
                MemoryCommand::Words => println!(
                    "{} / {} words",
                    memory.word_count(),
                    config.compression.max_words
                ),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_logging(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sandcoder=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Bring a sandbox up, run `f`, and tear the sandbox down whatever happens.
async fn with_sandbox<F, Fut>(config: &AgentConfig, f: F) -> anyhow::Result<ExitCode>
where
    F: FnOnce(Arc<SandboxExecutor>, ContainerSetupInfo) -> Fut,
    Fut: Future<Output = anyhow::Result<ExitCode>>,
{
    let executor = Arc::new(SandboxExecutor::docker(config.sandbox.clone())?);
    let hook = install_exit_hook(executor.clone());

    let result = match executor.initialize().await {
        Ok(info) => f(executor.clone(), info).await,
        Err(e) => Err(e.into()),
    };

    hook.abort();
    if let Err(e) = executor.cleanup().await {
        tracing::error!("Sandbox teardown failed: {}", e);
    }
    result
}
