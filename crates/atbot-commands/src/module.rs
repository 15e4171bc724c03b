use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use atbot_channels::types::InboundEvent;
use atbot_core::config::CommandsConfig;

use crate::config::{register_emoji_defaults, ModuleConfig};
use crate::lifecycle::CommandLifecycle;
use crate::tracker::CommandTracker;

/// How long tracked commands live and how often they are swept.
#[derive(Debug, Clone, Copy)]
pub struct JanitorSettings {
    pub retention: TimeDelta,
    pub interval: Duration,
}

impl From<&CommandsConfig> for JanitorSettings {
    fn from(cfg: &CommandsConfig) -> Self {
        Self {
            retention: i64::try_from(cfg.retention_secs)
                .ok()
                .and_then(TimeDelta::try_seconds)
                .unwrap_or(TimeDelta::MAX),
            interval: Duration::from_secs(cfg.sweep_interval_secs),
        }
    }
}

/// The command module: owns the lifecycle coordinator and the janitor.
pub struct CommandModule {
    lifecycle: Arc<CommandLifecycle>,
    janitor: JanitorSettings,
    generation: Arc<AtomicU64>,
    enabled: AtomicBool,
}

impl CommandModule {
    /// Register the module's config keys and wrap `lifecycle`. The module
    /// starts disabled.
    pub fn load(
        lifecycle: Arc<CommandLifecycle>,
        config: &dyn ModuleConfig,
        janitor: JanitorSettings,
    ) -> Self {
        register_emoji_defaults(config);
        Self {
            lifecycle,
            janitor,
            generation: Arc::new(AtomicU64::new(0)),
            enabled: AtomicBool::new(false),
        }
    }

    /// Start accepting events and start a janitor for this generation.
    pub fn enable(&self) -> JoinHandle<()> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.enabled.store(true, Ordering::SeqCst);
        info!(generation, "command module enabled");

        tokio::spawn(run_janitor(
            Arc::clone(self.lifecycle.tracker()),
            Arc::clone(&self.generation),
            generation,
            self.janitor,
        ))
    }

    /// Stop accepting events. The running janitor exits at its next tick.
    /// In-flight processing is not cancelled.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(generation, "command module disabled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn lifecycle(&self) -> &Arc<CommandLifecycle> {
        &self.lifecycle
    }

    /// Feed one inbound event through the lifecycle. Membership events and
    /// deletions are not handled here.
    pub async fn handle_event(&self, event: &InboundEvent) {
        if !self.is_enabled() {
            debug!("command module disabled; dropping event");
            return;
        }
        match event {
            InboundEvent::Message(msg) => self.lifecycle.handle_message(msg).await,
            InboundEvent::Edited(edit) => self.lifecycle.handle_edit(edit).await,
            InboundEvent::Deleted { message } => {
                debug!(message = %message, "message deleted; leaving its entry to expire");
            }
            InboundEvent::MemberJoined { .. } | InboundEvent::MemberLeft { .. } => {}
        }
    }
}

async fn run_janitor(
    tracker: Arc<CommandTracker>,
    live: Arc<AtomicU64>,
    generation: u64,
    settings: JanitorSettings,
) {
    loop {
        tokio::time::sleep(settings.interval).await;
        if live.load(Ordering::SeqCst) != generation {
            debug!(generation, "janitor retired");
            return;
        }
        let removed = tracker.sweep(settings.retention, Utc::now());
        if removed > 0 {
            debug!(removed, remaining = tracker.len(), "swept expired commands");
        }
    }
}
