use clap::builder::TypedValueParser as _;
use clap::Parser;
use delivery::DeliveryConfig;
use dotenvy::dotenv;
use log::LevelFilter;
use status::WaiterConfig;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

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
        default_value = "http://localhost:3000,https://localhost:3000"
    )]
    pub allowed_origins: Vec<String>,

    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: Option<String>,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 4000)]
    pub port: u16,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap_or(LevelFilter::Info)),
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
        .map(|s| s.parse::<RustEnv>().unwrap_or(RustEnv::Development)),
    )]
    pub runtime_env: RustEnv,

    /// Seconds a cached status snapshot lives before reads fall back to the store
    #[arg(long, env, default_value_t = 3600)]
    pub status_cache_ttl_secs: u64,

    /// Seconds between sweeps of expired status snapshots
    #[arg(long, env, default_value_t = 60)]
    pub status_cache_sweep_secs: u64,

    /// Milliseconds between re-checks of a long-polled resource
    #[arg(long, env, default_value_t = 1000)]
    pub long_poll_interval_ms: u64,

    /// Hard upper bound in milliseconds on any long poll, whatever the client asks for
    #[arg(long, env, default_value_t = 30_000)]
    pub long_poll_max_wait_ms: u64,

    /// Minimum progress difference (in points) a long poller is woken for
    #[arg(long, env, default_value_t = 5)]
    pub progress_threshold: u8,

    /// Seconds between heartbeat frames on open streams and sessions
    #[arg(long, env, default_value_t = 30)]
    pub heartbeat_interval_secs: u64,

    /// Seconds a resolved or closed room is remembered after its last member leaves
    #[arg(long, env, default_value_t = 3600)]
    pub room_retention_secs: u64,

    /// Frames buffered per streaming consumer before it is dropped as slow
    #[arg(long, env, default_value_t = 64)]
    pub stream_buffer: usize,

    /// Redis URL of the fan-out broker. Without one, events stay in this process.
    #[arg(long, env)]
    broker_url: Option<String>,

    /// Identifies this process on the broker. Defaults to a random UUID.
    #[arg(long, env)]
    process_id: Option<String>,
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

    pub fn broker_url(&self) -> Option<&str> {
        self.broker_url.as_deref()
    }

    pub fn set_broker_url(mut self, broker_url: String) -> Self {
        self.broker_url = Some(broker_url);
        self
    }

    pub fn runtime_env(&self) -> RustEnv {
        self.runtime_env.clone()
    }

    pub fn is_production(&self) -> bool {
        self.runtime_env() == RustEnv::Production
    }

    /// Tunables handed to the delivery coordinator.
    pub fn delivery_config(&self) -> DeliveryConfig {
        let defaults = DeliveryConfig::default();
        DeliveryConfig {
            process_id: self.process_id.clone().unwrap_or(defaults.process_id),
            cache_ttl: Duration::from_secs(self.status_cache_ttl_secs),
            cache_sweep_interval: Duration::from_secs(self.status_cache_sweep_secs.max(1)),
            waiter: WaiterConfig {
                poll_interval: Duration::from_millis(self.long_poll_interval_ms.max(1)),
                max_wait: Duration::from_millis(self.long_poll_max_wait_ms),
                progress_threshold: self.progress_threshold,
            },
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs.max(1)),
            room_retention: Duration::from_secs(self.room_retention_secs),
            stream_buffer: self.stream_buffer,
            session_buffer: defaults.session_buffer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::parse_from(std::iter::once("delivery_platform").chain(args.iter().copied()))
    }

    #[test]
    fn test_rust_env_parses_case_insensitively() {
        assert_eq!("PRODUCTION".parse::<RustEnv>(), Ok(RustEnv::Production));
        assert_eq!("staging".parse::<RustEnv>(), Ok(RustEnv::Staging));
        assert_eq!("qa".parse::<RustEnv>(), Err(RustEnvParseError));
    }

    #[test]
    fn test_delivery_config_uses_configured_tunables() {
        let config = parse(&[
            "--long-poll-interval-ms",
            "250",
            "--long-poll-max-wait-ms",
            "10000",
            "--progress-threshold",
            "10",
            "--process-id",
            "node-a",
            "--room-retention-secs",
            "600",
        ]);
        let delivery = config.delivery_config();

        assert_eq!(delivery.process_id, "node-a");
        assert_eq!(delivery.waiter.poll_interval, Duration::from_millis(250));
        assert_eq!(delivery.waiter.max_wait, Duration::from_secs(10));
        assert_eq!(delivery.waiter.progress_threshold, 10);
        assert_eq!(delivery.cache_ttl, Duration::from_secs(3600));
        assert_eq!(delivery.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(delivery.room_retention, Duration::from_secs(600));
    }

    #[test]
    fn test_broker_url_is_optional() {
        assert!(parse(&[]).broker_url().is_none());
        let config = parse(&["--broker-url", "redis://localhost:6379"]);
        assert_eq!(config.broker_url(), Some("redis://localhost:6379"));
    }
}
