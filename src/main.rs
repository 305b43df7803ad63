//! genbot - Entry Point
//!
//! Runs the Telegram dispatcher and the webhook ingress side by side; both
//! share the job engine.

use genbot::jobs::{JobEngine, JobStore};
use genbot::providers::ProviderClient;
use genbot::telegram::{run_bot, BotData};
use genbot::{Config, TelegramNotifier};
use std::sync::Arc;
use teloxide::Bot;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("genbot v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: genbot");
        println!();
        println!("Environment variables:");
        println!("  TELEGRAM_BOT_TOKEN      Telegram bot token");
        println!("  PROVIDER_API_TOKEN      Generation provider API token");
        println!("  WEBHOOK_BASE_URL        Public URL for provider callbacks");
        println!("  VIDEO_MODEL_VERSION     Provider model version for /video");
        println!("  IMAGE_MODEL_VERSION     Provider model version for /image");
        println!("  BIND_ADDR               Ingress bind address (default 0.0.0.0:8080)");
        println!("  JOBS_DB_PATH            Job store path (default jobs.db)");
        println!("  TELEGRAM_ALLOWED_USERS  CSV of allowed user ids (empty = all)");
        println!("  BRAND_PREFIX            Prefix on outgoing messages");
        return Ok(());
    }

    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("genbot v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let store = JobStore::open(&config.db_path)?;

    let bot = Bot::new(config.telegram_token.clone());
    let notifier = Arc::new(TelegramNotifier::new(bot.clone(), &config.brand_prefix));
    let engine = Arc::new(JobEngine::new(store, notifier));
    let provider = ProviderClient::new(&config.provider_token, &config.webhook_url());

    let ingress = {
        let engine = Arc::clone(&engine);
        let addr = config.bind_addr;
        tokio::spawn(async move { genbot::webhook::serve(addr, engine).await })
    };

    let data = Arc::new(BotData::new(&config, engine, provider));
    run_bot(bot, data).await?;

    ingress.abort();
    Ok(())
}
