use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use atbot_channels::MembershipHandle;
use atbot_core::config::AtbotConfig;
use atbot_slack::SlackClient;

mod app;
mod http;

#[derive(Parser)]
#[command(name = "atbot-gateway", version, about = "Slack command bot gateway")]
struct Cli {
    /// Config file (default: $ATBOT_CONFIG, then ~/.atbot/atbot.toml)
    #[arg(long, short)]
    config: Option<String>,

    /// Override the listen address
    #[arg(long)]
    bind: Option<String>,

    /// Override the listen port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "atbot_gateway=info,atbot_commands=info,tower_http=debug".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // explicit path > ATBOT_CONFIG env > ~/.atbot/atbot.toml
    let config_path = cli.config.or_else(|| std::env::var("ATBOT_CONFIG").ok());
    let mut config = AtbotConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!(code = e.code(), "Config load failed ({}), using defaults", e);
        AtbotConfig::default()
    });
    if let Some(bind) = cli.bind {
        config.gateway.bind = bind;
    }
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    config.validate()?;
    if config.slack.signing_secret.is_empty() {
        tracing::warn!("slack.signing_secret is empty; event requests are NOT verified");
    }

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;

    let transport = Arc::new(SlackClient::new(
        config.slack.bot_token.clone(),
        config.slack.team_domain.clone(),
    )?);
    let (membership, membership_worker) = MembershipHandle::spawn();

    let state = Arc::new(app::AppState::new(config, transport, membership));
    let janitor = state.module.enable();
    info!(bot_user = %state.bot_user, "command module enabled");

    let router = app::build_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("atbot gateway listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;

    // the janitor would only notice the disable at its next tick
    state.module.disable();
    janitor.abort();
    state.tasks.close();
    state.tasks.wait().await;
    membership_worker.abort();
    info!("atbot gateway stopped");
    Ok(())
}
