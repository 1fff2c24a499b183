use dotenvy::dotenv;
use namewatch::bot::handlers::{handle_command, handle_document, Command};
use namewatch::bot::{AllowList, CheckerState, DenialCooldown, TelegramNotifier};
use namewatch::checker::{
    spawn_reaper, Notifier, Probe, SessionRegistry, UserAgentPool, UsernameProbe,
};
use namewatch::config::{
    Settings, REAPER_PERIOD, SESSION_IDLE_TIMEOUT, UNAUTHORIZED_CACHE_MAX_SIZE,
    UNAUTHORIZED_COOLDOWN_SECS, USER_AGENT_POOL_SIZE,
};
use std::sync::Arc;
use std::time::Duration;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_logging();

    info!("Starting NameWatch bot...");

    let settings = init_settings();
    let bot = Bot::new(settings.telegram_token.clone());

    let user_agents = Arc::new(UserAgentPool::generate(USER_AGENT_POOL_SIZE));
    let probe: Arc<dyn Probe> = Arc::new(UsernameProbe::new(
        settings.profile_api_url.clone(),
        user_agents,
    ));
    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(
        bot.clone(),
        settings.message_delay(),
    ));
    let registry = Arc::new(SessionRegistry::new());

    let state = Arc::new(CheckerState {
        settings,
        registry: registry.clone(),
        probe,
        notifier,
        allow_list: Arc::new(AllowList::new()),
        denial_cooldown: Arc::new(DenialCooldown::new(
            Duration::from_secs(UNAUTHORIZED_COOLDOWN_SECS),
            UNAUTHORIZED_CACHE_MAX_SIZE,
        )),
    });

    let _reaper = spawn_reaper(registry, REAPER_PERIOD, SESSION_IDLE_TIMEOUT);

    info!("Bot is running...");

    Dispatcher::builder(bot, setup_handler())
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_settings() -> Arc<Settings> {
    match Settings::new().and_then(|s| s.validate().map(|()| s)) {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry().branch(
        Update::filter_message()
            .branch(
                dptree::entry()
                    .filter_command::<Command>()
                    .endpoint(dispatch_command),
            )
            .branch(
                dptree::filter(|msg: Message| msg.document().is_some())
                    .endpoint(dispatch_document),
            ),
    )
}

async fn dispatch_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    state: Arc<CheckerState>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handle_command(bot, msg, cmd, state).await {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn dispatch_document(
    bot: Bot,
    msg: Message,
    state: Arc<CheckerState>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handle_document(bot, msg, state).await {
        error!("Document handler error: {}", e);
    }
    respond(())
}
