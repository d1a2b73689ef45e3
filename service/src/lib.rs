use broker::{ChannelBroker, MemoryBroker, RedisBroker, RedisSettings};
use config::Config;
use log::info;
use std::sync::Arc;

pub mod config;
pub mod logging;

impl Config {
    /// Redis connection settings, when a broker URL is configured.
    pub fn redis_settings(&self) -> Option<RedisSettings> {
        self.broker_url().map(|url| {
            let mut settings = RedisSettings::new(url);
            settings.connect_retries = self.broker_connect_retries;
            settings.retry_delay_ms = self.broker_retry_delay_ms;
            settings
        })
    }

    pub fn sse_settings(&self) -> sse::Settings {
        sse::Settings {
            poll_interval: self.poll_interval(),
            poll_retry_ms: self.poll_retry_ms,
            keep_alive: self.keep_alive(),
        }
    }
}

/// Connects the pub/sub broker: Redis when a broker URL is configured, otherwise
/// an in-process broker.
pub async fn init_broker(config: &Config) -> Result<Arc<dyn ChannelBroker>, broker::Error> {
    match config.redis_settings() {
        Some(settings) => {
            info!(
                "Broker config: redis, connect_retries={}, retry_delay={}ms",
                settings.connect_retries, settings.retry_delay_ms
            );
            let broker = RedisBroker::connect(&settings).await?;
            Ok(Arc::new(broker))
        }
        None => {
            info!("Broker config: in-memory, channels are local to this process");
            Ok(Arc::new(MemoryBroker::new()))
        }
    }
}

// Service-level state containing only infrastructure concerns
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub sse_manager: Arc<sse::Manager>,
}

impl AppState {
    pub fn new(app_config: Config, broker: Arc<dyn ChannelBroker>) -> Self {
        let sse_manager = Arc::new(sse::Manager::new(broker, app_config.sse_settings()));
        Self {
            config: app_config,
            sse_manager,
        }
    }

    pub fn sse_manager_ref(&self) -> &sse::Manager {
        self.sse_manager.as_ref()
    }
}
