use anyhow::{Context, Result};
use clap::Parser;
use smspilot::{build_router, logging, AppState};
use smspilot_core::ai::{build_oracle, PromptsConfig};
use smspilot_core::channel::desktop::default_desktop;
use smspilot_core::config::{AppConfig, ReplyMode, Secrets};
use smspilot_core::db::ExecutionLog;
use smspilot_core::sms::{SmsSender, TwilioClient};
use smspilot_core::Pipeline;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file; defaults to config.json in the app data directory
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the config file
    #[arg(long)]
    bind: Option<String>,

    /// Load environment variables from this file instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match &args.env_file {
        Some(path) => {
            dotenvy::from_path(path).with_context(|| format!("cannot load {}", path.display()))?;
        }
        None => {
            let _ = dotenvy::dotenv();
        }
    }

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => AppConfig::default_path()?,
    };
    let mut config = AppConfig::load_or_init(&config_path)?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    config.validate()?;

    logging::init_logging(&config.log_dir()?);
    tracing::info!("Config: {}", config_path.display());

    let secrets = Secrets::from_env();
    let oracle = build_oracle(&config.oracle, &secrets);
    let prompts = PromptsConfig::load(config_path.parent());

    let mut pipeline = Pipeline::from_config(&config, oracle, prompts, default_desktop());
    match ExecutionLog::open(&config.database_path()?).await {
        Ok(log) => pipeline = pipeline.with_log(log),
        Err(e) => tracing::error!("Execution log disabled: {:#}", e),
    }
    tracing::info!("Tier order: {:?}", pipeline.tier_order());

    let sms: Option<Arc<dyn SmsSender>> = match secrets.twilio.clone() {
        Some(credentials) => Some(Arc::new(TwilioClient::new(credentials)?)),
        None => None,
    };
    if config.sms.reply_mode == ReplyMode::Rest && sms.is_none() {
        tracing::warn!("reply_mode is rest but Twilio credentials are missing; replies will be inline TwiML");
    }

    let state = Arc::new(AppState {
        pipeline,
        sms,
        reply_mode: config.sms.reply_mode,
    });
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("cannot bind {}", config.server.bind))?;
    tracing::info!("SMSPilot listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
        .context("server error")?;
    Ok(())
}
