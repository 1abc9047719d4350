use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use interactive_feedback::{
    config::{Config, DEFAULT_LOG_LEVEL},
    dialog::{FeedbackForm, tui},
    enhancer::{GeminiEnhancer, PromptEnhancer},
    error::EXIT_INVALID_INPUT,
    models::FeedbackRequest,
    server::FeedbackServer,
};
use rmcp::{ServiceExt, transport::stdio};
use tracing::info;

#[derive(Parser)]
#[command(name = "interactive-feedback")]
#[command(about = "Interactive feedback dialog and MCP server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the interactive_feedback tool over MCP stdio (default)
    Serve,
    /// Show the feedback dialog once and print the result as JSON
    Dialog {
        /// Request JSON; read from stdin when neither this nor --request-file is given
        #[arg(long, conflicts_with = "request_file")]
        request: Option<String>,
        #[arg(long)]
        request_file: Option<PathBuf>,
        /// Write the result here instead of stdout
        #[arg(long)]
        output_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            init_tracing(&config.log_filter(DEFAULT_LOG_LEVEL));
            serve(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Dialog {
            request,
            request_file,
            output_file,
        } => {
            init_tracing(&config.log_filter("interactive_feedback=warn"));
            // The launcher relays stderr to the assistant; keep it to one line
            match dialog(config, request, request_file, output_file).await {
                Ok(code) => Ok(code),
                Err(e) => {
                    eprintln!("{:#}", e);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

// stdout carries MCP frames or the dialog result, so logs go to stderr
fn init_tracing(filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

async fn serve(config: Config) -> Result<()> {
    info!("🚀 Starting interactive feedback MCP server");
    info!(
        "📊 Configuration loaded from {}: model={}, enhancement={}, terminal={:?}",
        config.runtime.config_path,
        config.enhancer.model,
        if config.enhancer.api_key.is_some() { "enabled" } else { "disabled" },
        config.dialog.terminal_command
    );

    let server = FeedbackServer::new(&config).map_err(|e| {
        eprintln!("Failed to create server: {}", e);
        e
    })?;

    let service = server.serve(stdio()).await.map_err(|e| {
        eprintln!("Failed to start MCP service: {}", e);
        e
    })?;

    info!("🎯 MCP server ready - waiting for requests...");
    service.waiting().await?;
    Ok(())
}

async fn dialog(
    config: Config,
    request: Option<String>,
    request_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
) -> Result<ExitCode> {
    let payload = match (request, request_file) {
        (Some(inline), _) => inline,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("reading request file {}", path.display()))?,
        (None, None) => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading request from stdin")?;
            buf
        }
    };

    let request = match FeedbackRequest::from_json(&payload) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(ExitCode::from(EXIT_INVALID_INPUT as u8));
        }
    };

    let form = FeedbackForm::new(request, config.dialog.max_image_bytes);
    let enhancer: Arc<dyn PromptEnhancer> = Arc::new(GeminiEnhancer::new(&config.enhancer));
    let result = tui::run(form, enhancer).await?;

    let json = serde_json::to_string(&result)?;
    match output_file {
        Some(path) => std::fs::write(&path, json)
            .with_context(|| format!("writing result to {}", path.display()))?,
        None => println!("{}", json),
    }
    Ok(ExitCode::from(result.exit_code() as u8))
}
