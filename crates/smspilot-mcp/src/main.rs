use anyhow::Result;
use clap::Parser;
use smspilot_core::channel::tool_protocol::{EDITOR_ENV, WORKSPACE_ENV};
use smspilot_core::config::Secrets;
use smspilot_core::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, PARSE_ERROR};
use smspilot_core::tools::create_default_registry;
use std::io;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

mod context;
mod server;

use server::McpServer;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory the tools may read and write
    #[arg(long, env = WORKSPACE_ENV, default_value = ".")]
    workspace: PathBuf,

    /// Editor CLI used by open_file
    #[arg(long, env = EDITOR_ENV, default_value = "cursor")]
    editor: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries JSON-RPC only; logs go to stderr without colors
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into());
    fmt()
        .with_env_filter(env_filter)
        .with_ansi(false)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let ctx = context::build_context(&args.workspace, &args.editor, &Secrets::from_env())?;
    let server = McpServer::new(create_default_registry(ctx));

    info!("smspilot-mcp server loop ready");

    let mut reader = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
            Ok(request) => server.handle_request(request).await,
            Err(e) => {
                error!("Unparseable request: {}", e);
                Some(JsonRpcResponse::failure(
                    None,
                    JsonRpcError::new(PARSE_ERROR, format!("Parse error: {}", e)),
                ))
            }
        };

        if let Some(response) = response {
            let mut json_str = serde_json::to_string(&response)?;
            json_str.push('\n');
            stdout.write_all(json_str.as_bytes()).await?;
            stdout.flush().await?;
        }
    }

    info!("stdin closed, exiting");
    Ok(())
}
