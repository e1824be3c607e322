use std::sync::Arc;

use ekolina::channels::{Channel, CliChannel, TelegramChannel};
use ekolina::config::{BotConfig, ChannelKind};
use ekolina::context::AppContext;
use ekolina::dispatcher::Dispatcher;
use ekolina::error::Error;
use ekolina::store::UserStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A local .env is optional
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = match BotConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", Error::from(e));
            eprintln!("  export TELEGRAM_TOKEN=123456:ABC...");
            eprintln!("  export ADMIN_IDS=111111111,222222222");
            std::process::exit(1);
        }
    };

    let store = UserStore::load(&config.user_data_path)
        .await
        .map_err(Error::from)?;
    let store = Arc::new(store);

    eprintln!("🌱 Ekolina v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Channel: {:?}", config.channel);
    eprintln!(
        "   User data: {} ({} users)",
        config.user_data_path.display(),
        store.len().await
    );
    eprintln!("   Admins: {}", config.admin_ids.len());
    match &config.greeting_photo {
        Some(path) => eprintln!("   Greeting photo: {}", path.display()),
        None => eprintln!("   Greeting photo: none"),
    }
    if config.channel == ChannelKind::Cli {
        eprintln!(
            "   Speaking as user {}. Use /start, #<button> for inline buttons, /quit to exit.\n",
            config.cli_user_id
        );
    }

    let channel: Arc<dyn Channel> = match config.channel {
        ChannelKind::Telegram => Arc::new(TelegramChannel::new(config.bot_token.clone())),
        ChannelKind::Cli => Arc::new(CliChannel::new(config.cli_user_id)),
    };

    if let Err(e) = channel.health_check().await {
        tracing::warn!(channel = channel.name(), error = %e, "Channel health check failed");
    }

    let stream = channel.start().await.map_err(Error::from)?;

    let ctx = Arc::new(AppContext::new(config, store, Arc::clone(&channel)));
    Dispatcher::new(ctx).run(stream).await?;

    Ok(())
}
