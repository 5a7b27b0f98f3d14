//! Composition root: wires every service against `Settings` and hands out
//! a single `Clone`-able handle the API layer holds as `axum::State`.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::alerts::notify::discord::DiscordNotifier;
use crate::alerts::notify::email::EmailNotifier;
use crate::alerts::notify::webhook::WebhookNotifier;
use crate::alerts::notify::{Dispatcher, Notifier};
use crate::alerts::rules::RuleEngine;
use crate::alerts::AlertPipeline;
use crate::api::security::{AdminAuthenticator, StaticTokenAuthenticator};
use crate::cache::Cache;
use crate::config::Settings;
use crate::eventbus::EventBus;
use crate::ip_pool::IpPoolManager;
use crate::nat::turn::{RelayPool, StaticRelayPool};
use crate::nat::NatCoordinator;
use crate::presence::PresenceTracker;
use crate::store::Store;
use crate::topology::TopologyResolver;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Store,
    pub cache: Cache,
    pub bus: EventBus,
    pub ip_pool: IpPoolManager,
    pub topology: TopologyResolver,
    pub nat: NatCoordinator,
    pub presence: PresenceTracker,
    pub alerts: AlertPipeline,
    pub admin_auth: Arc<dyn AdminAuthenticator>,
}

impl AppState {
    /// Builds every service in dependency order and spawns the
    /// notification worker pool. Background loops that run for the
    /// process lifetime (event fan-out, heartbeat sweep, presence sweep,
    /// rule hot-reload) are started separately by the caller, which holds
    /// the root `CancellationToken` — this only constructs state.
    pub async fn build(settings: Settings, shutdown: CancellationToken) -> anyhow::Result<Self> {
        let store = Store::connect(&settings.store).await?;
        store.migrate().await?;
        let cache = Cache::connect(&settings.ephemeral).await?;
        let bus = EventBus::new(cache.clone());
        let ip_pool = IpPoolManager::new();
        let topology = TopologyResolver::new(store.clone(), cache.clone());
        let presence = PresenceTracker::new(store.clone(), topology.clone(), bus.clone());

        let relay_pool: Arc<dyn RelayPool> = Arc::new(StaticRelayPool::new(Vec::new()));
        let nat = NatCoordinator::new(store.clone(), cache.clone(), topology.clone(), relay_pool);

        let notifiers: Vec<Arc<dyn Notifier>> = vec![
            Arc::new(EmailNotifier::new(settings.email.clone())),
            Arc::new(WebhookNotifier::new(settings.webhook.url.clone())),
            Arc::new(DiscordNotifier::new(settings.webhook.discord_url.clone())),
        ];
        let dispatcher = Dispatcher::spawn(notifiers, &settings.alerts, settings.alerts.worker_count, shutdown.clone());
        let rules = RuleEngine::new(settings.alerts.rules_path.clone());
        let alerts = AlertPipeline::new(store.clone(), cache.clone(), bus.clone(), settings.alerts.clone(), rules, dispatcher);

        Ok(Self {
            settings: Arc::new(settings),
            store,
            cache,
            bus,
            ip_pool,
            topology,
            nat,
            presence,
            alerts,
            admin_auth: Arc::new(StaticTokenAuthenticator::from_env()),
        })
    }
}
