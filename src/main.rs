use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tgdrop::config::{ClientConfig, DEFAULT_API_URL, DEFAULT_CHUNK_SIZE, RETRY_DELAY};
use tgdrop::errors::UploadError;
use tgdrop::transfer::TransferClient;
use tgdrop::transport::BotApiTransport;
use tgdrop::types::{Credentials, TransferRequest, TransferResult};
use tgdrop::ui::output::{self, ProgressPrinter};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tgdrop")]
#[command(about = "Upload large files to a chat through the bot API")]
struct Cli {
    #[arg(long, env = "TGDROP_API_ID", help = "API ID")]
    api_id: String,

    #[arg(long, env = "TGDROP_API_HASH", hide_env_values = true, help = "API hash")]
    api_hash: String,

    #[arg(long, env = "TGDROP_BOT_TOKEN", hide_env_values = true, help = "Bot token")]
    bot_token: String,

    // Chat ids of groups and channels are negative
    #[arg(
        long,
        env = "TGDROP_CHAT_ID",
        allow_hyphen_values = true,
        help = "Target chat ID or @username"
    )]
    chat_id: String,

    #[arg(long, help = "Path to file to upload")]
    file: PathBuf,

    #[arg(long, help = "Message thread (topic) ID for forum chats")]
    thread_id: Option<i64>,

    #[arg(long, env = "TGDROP_API_URL", default_value = DEFAULT_API_URL, help = "Bot API base URL")]
    api_url: String,

    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, help = "Part size in bytes")]
    chunk_size: usize,

    #[arg(long, default_value_t = 60, help = "Request timeout in seconds")]
    timeout: u64,

    #[arg(
        long,
        default_value_t = 0,
        help = "Restart the upload this many times on flood control or network errors"
    )]
    retries: u32,
}

#[tokio::main]
async fn main() -> ExitCode {
    // stdout carries progress lines only; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(result) => {
            output::print_success(&result);
            ExitCode::SUCCESS
        }
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            let code = e
                .downcast_ref::<UploadError>()
                .map(|e| e.exit_code())
                .unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli) -> Result<TransferResult> {
    let config = ClientConfig::new(cli.chunk_size, cli.api_url, Duration::from_secs(cli.timeout))
        .with_retries(cli.retries, RETRY_DELAY);
    let client = TransferClient::new(config)?;

    let credentials = Credentials::new(cli.api_id, cli.api_hash, cli.bot_token);
    let request = TransferRequest::new(cli.chat_id, cli.file).with_thread(cli.thread_id);

    // fail fast before any connection is made
    credentials.validate()?;
    request.validate().await?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    let ctrl_c_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::error!("Failed to listen for Ctrl+C");
            return;
        }
        tracing::info!("Ctrl+C received - cancelling upload");
        signal_token.cancel();
    });

    println!(
        "Uploading {} to {}...",
        request.path.display(),
        request.destination
    );

    let mut printer = ProgressPrinter::stdout();
    let result = client
        .send_with_retries(
            || BotApiTransport::new(client.config()),
            &credentials,
            &request,
            &mut printer,
            &cancel,
        )
        .await;
    drop(printer);

    ctrl_c_task.abort();
    Ok(result?)
}
