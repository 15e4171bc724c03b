use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::warn;

use atbot_channels::{ChatTransport, InboundEvent, MembershipHandle};
use atbot_commands::builtin::register_builtins;
use atbot_commands::config::apply_emoji_overrides;
use atbot_commands::module::JanitorSettings;
use atbot_commands::{
    CommandLifecycle, CommandModule, CommandRegistry, CommandTracker, InMemoryModuleConfig,
    LifecycleOptions,
};
use atbot_core::config::AtbotConfig;
use atbot_core::types::{ChannelId, UserId};

/// Central shared state, passed as `Arc<AppState>` to all Axum handlers.
pub struct AppState {
    pub config: AtbotConfig,
    pub bot_user: UserId,
    pub module: CommandModule,
    pub membership: MembershipHandle,
    /// Every spawned event-processing task; drained on shutdown.
    pub tasks: TaskTracker,
}

impl AppState {
    /// Wire the command engine on top of `transport`.
    pub fn new(
        config: AtbotConfig,
        transport: Arc<dyn ChatTransport>,
        membership: MembershipHandle,
    ) -> Self {
        let bot_user = UserId::from(config.slack.bot_user_id.as_str());

        let registry = Arc::new(CommandRegistry::new());
        register_builtins(&registry, membership.clone());

        let module_config = Arc::new(InMemoryModuleConfig::new());
        let log_channel = config.slack.log_channel.as_deref().map(ChannelId::from);
        let lifecycle = Arc::new(CommandLifecycle::new(
            &bot_user,
            Arc::new(CommandTracker::new()),
            transport,
            registry,
            module_config.clone(),
            LifecycleOptions::from_config(&config.commands, log_channel),
        ));
        let module = CommandModule::load(
            lifecycle,
            module_config.as_ref(),
            JanitorSettings::from(&config.commands),
        );
        apply_emoji_overrides(module_config.as_ref(), &config.commands.emoji);

        Self {
            config,
            bot_user,
            module,
            membership,
            tasks: TaskTracker::new(),
        }
    }

    /// Process one inbound event on its own task.
    pub fn spawn_event(self: &Arc<Self>, event: InboundEvent) {
        let state = Arc::clone(self);
        self.tasks.spawn(async move {
            match &event {
                InboundEvent::MemberJoined { channel, user } => {
                    if let Err(e) = state.membership.set_membership(user, channel, true).await {
                        warn!(error = %e, "failed to record channel join");
                    }
                }
                InboundEvent::MemberLeft { channel, user } => {
                    if let Err(e) = state.membership.set_membership(user, channel, false).await {
                        warn!(error = %e, "failed to record channel leave");
                    }
                }
                _ => state.module.handle_event(&event).await,
            }
        });
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/slack/events", post(crate::http::events::events_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
