use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use openwork::logger::init_tracing;
use openwork::server::client::SessionClient;
use openwork::server::supervisor::{ServerSupervisor, build_server_url};
use openwork::server::ApiClient;
use openwork::settings::Settings;
use openwork::vault::FsVault;
use openwork::workflow::WorkflowCompiler;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "openwork",
    about = "Local opencode server supervisor and workflow host",
    version
)]
struct Cli {
    /// Path to a settings JSON file
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (e.g. error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the server and keep it supervised until ctrl-c
    Serve(ServeArgs),

    /// Compile a canvas file into a workflow graph and print the result
    Compile(CompileArgs),

    /// List sessions on a running server
    Sessions,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Override the configured project directory
    #[arg(long)]
    project_dir: Option<PathBuf>,

    /// Override the configured preferred port
    #[arg(long)]
    port: Option<u16>,

    /// Write logs to a rolling file as well as stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CompileArgs {
    /// Canvas path, relative to the project directory
    canvas: String,

    /// Project directory the canvas lives in (defaults to the configured one)
    #[arg(long)]
    project_dir: Option<PathBuf>,
}

fn load_settings(path: &Option<PathBuf>) -> anyhow::Result<Settings> {
    match path {
        Some(path) => Settings::load(path),
        None => Ok(Settings::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            init_tracing(&cli.log_level, args.log_file.clone())?;
            let mut settings = load_settings(&cli.settings)?;
            if let Some(project_dir) = args.project_dir {
                settings.project_directory = Some(project_dir);
            }
            if let Some(port) = args.port {
                settings.port = port;
            }
            serve(settings).await
        }
        Commands::Compile(args) => {
            init_tracing(&cli.log_level, None)?;
            let settings = load_settings(&cli.settings)?;
            let project_dir = args
                .project_dir
                .or(settings.project_directory)
                .context("no project directory configured; pass --project-dir")?;
            let vault = Arc::new(FsVault::new(project_dir));
            let compiler = WorkflowCompiler::new(vault);
            let result = compiler.compile(&args.canvas).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Sessions => {
            init_tracing(&cli.log_level, None)?;
            let settings = load_settings(&cli.settings)?;
            let project_dir = settings
                .project_directory
                .clone()
                .context("no project directory configured")?;
            let url = build_server_url(&settings.hostname, settings.port, &project_dir);
            let client = ApiClient::new(url, settings.basic_auth.clone());
            let sessions = client.list_sessions().await?;
            println!("{}", serde_json::to_string_pretty(&sessions)?);
            Ok(())
        }
    }
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    let supervisor = ServerSupervisor::new(settings.server_config());
    let _state_sub = supervisor.on_state_change(|state| {
        info!(?state, "server state changed");
    });

    if !supervisor.start().await {
        bail!(
            "server failed to start: {}",
            supervisor
                .last_error()
                .unwrap_or_else(|| "unknown error".to_string())
        );
    }
    if let Some(url) = supervisor.url() {
        info!(%url, "server ready");
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    supervisor.stop();
    Ok(())
}
