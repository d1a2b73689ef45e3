use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Channel used when a request does not name one.
pub const DEFAULT_CHANNEL: &str = "default";

/// Payload sent by the publish endpoint when no message is supplied.
pub const DEFAULT_PUBLISH_MESSAGE: &str = "Hello world!";

#[derive(Clone, Debug, PartialEq)]
pub enum RustEnv {
    Development,
    Production,
    Staging,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RustEnvParseError;

impl FromStr for RustEnv {
    type Err = RustEnvParseError;
    fn from_str(level: &str) -> Result<RustEnv, Self::Err> {
        match level.to_lowercase().as_str() {
            "development" => Ok(RustEnv::Development),
            "production" => Ok(RustEnv::Production),
            "staging" => Ok(RustEnv::Staging),
            _ => Err(RustEnvParseError),
        }
    }
}

impl fmt::Display for RustEnv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RustEnv::Development => write!(f, "development"),
            RustEnv::Production => write!(f, "production"),
            RustEnv::Staging => write!(f, "staging"),
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// A list of full CORS origin URLs that allowed to receive server responses.
    #[arg(
        long,
        env,
        value_delimiter = ',',
        use_value_delimiter = true,
        default_value = "http://localhost:8000,http://127.0.0.1:8000"
    )]
    pub allowed_origins: Vec<String>,

    /// Redis URL of the pub/sub broker (e.g. redis://127.0.0.1:6379). When unset,
    /// an in-process broker is used and channels only span this process.
    #[arg(long, env)]
    broker_url: Option<String>,

    /// Connection attempts made after the first failure when connecting to the broker
    #[arg(long, env, default_value_t = 3)]
    pub broker_connect_retries: u32,

    /// Delay in milliseconds before the first broker reconnection attempt (doubles each retry)
    #[arg(long, env, default_value_t = 250)]
    pub broker_retry_delay_ms: u64,

    /// Interval in milliseconds between polls of the in-memory event queue (at least 1)
    #[arg(long, env, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval_ms: u64,

    /// Reconnection delay hint (SSE `retry` field) sent with polled events, in milliseconds
    #[arg(long, env, default_value_t = 15000)]
    pub poll_retry_ms: u64,

    /// Seconds between keep-alive comments on idle streams. 0 disables keep-alive.
    #[arg(long, env, default_value_t = 15)]
    pub keep_alive_secs: u64,

    /// Channel streamed or published to when a request does not name one
    #[arg(long, env, default_value = DEFAULT_CHANNEL)]
    default_channel: String,

    /// Message published by the publish endpoint when the request does not supply one
    #[arg(long, env, default_value = DEFAULT_PUBLISH_MESSAGE)]
    publish_message: String,

    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: Option<String>,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 8000)]
    pub port: u16,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,

    /// Set the Rust runtime environment to use.
    #[arg(
    short,
    long,
    env,
    default_value_t = RustEnv::Development,
    value_parser = clap::builder::PossibleValuesParser::new([
        "DEVELOPMENT", "PRODUCTION", "STAGING",
        "development", "production", "staging"
    ])
        .map(|s| s.parse::<RustEnv>().unwrap()),
    )]
    pub runtime_env: RustEnv,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn set_broker_url(mut self, broker_url: String) -> Self {
        self.broker_url = Some(broker_url);
        self
    }

    pub fn broker_url(&self) -> Option<&str> {
        self.broker_url.as_deref()
    }

    pub fn default_channel(&self) -> &str {
        &self.default_channel
    }

    pub fn publish_message(&self) -> &str {
        &self.publish_message
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Keep-alive period for idle streams, or `None` when disabled.
    pub fn keep_alive(&self) -> Option<Duration> {
        (self.keep_alive_secs > 0).then(|| Duration::from_secs(self.keep_alive_secs))
    }

    pub fn runtime_env(&self) -> RustEnv {
        self.runtime_env.clone()
    }

    pub fn is_production(&self) -> bool {
        self.runtime_env() == RustEnv::Production
    }
}
