use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use lib_rislive::core::IngestOptions;
use lib_rislive::ingestors::StreamConfig;
use lib_rislive::protocol::ris_message::{BgpType, ClientDirective, Require, subscribe_url};
use lib_rislive::retrieve::ky_http::ClientOptions;
use lib_rislive::validate::ValidatorEndpoint;
use lib_rislive::{EmitPolicy, UnknownPolicy};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up in the working directory, then in `$HOME`.
pub const CONFIG_FILE: &str = "config.json";

/// Longest accepted read timeout or heartbeat period, in seconds.
const MAX_TIMER_SECS: u64 = 24 * 60 * 60;

#[derive(Parser, Debug)]
#[clap(name = "bgpvalidator", about = "BGP data collector for the RIS Live UPDATE stream with RPKI origin validation", version)]
pub struct Cli {
    #[clap(long, global = true, env = "BGPVALIDATOR_CONFIG", help = "Path to the JSON configuration file (default ./config.json, then $HOME/config.json).")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Subscribe to RIS Live and write the announced origin / prefix pairs.
    Subscribe(SubscribeArgs),
}

/// Command line and environment overrides for the `subscribe` command.
#[derive(Args, Debug, Clone, Default)]
pub struct SubscribeArgs {
    #[clap(long, env = "RISLIVE_CLIENT_ID", help = "Client name sent to RIS Live in the subscribe URL.")]
    pub client_id: Option<String>,

    #[clap(long, env = "RISLIVE_DURATION", help = "Session length in seconds.")]
    pub duration: Option<u64>,

    #[clap(long, env = "RISLIVE_ONLY_IPV4", num_args = 0..=1, default_missing_value = "true", help = "Drop IPv6 prefixes.")]
    pub only_ipv4: Option<bool>,

    #[clap(long, env = "RISLIVE_URL", help = "Feed URL, replacing the public RIS Live endpoint.")]
    pub url: Option<String>,

    #[clap(long, env = "BGPVALIDATOR_EMIT_POLICY", help = "Which facts to write (all, only-valid, annotate).")]
    pub emit_policy: Option<EmitPolicy>,

    #[clap(long, env = "BGPVALIDATOR_UNKNOWN_POLICY", help = "What to do with facts the validator could not judge (reject, accept).")]
    pub unknown_policy: Option<UnknownPolicy>,

    #[clap(long, env = "BGPVALIDATOR_OUTPUT", help = "Result file.")]
    pub output: Option<PathBuf>,

    #[clap(long, env = "BGPVALIDATOR_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "BGPVALIDATOR_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,
}

/// Everything the `subscribe` command needs, as read from `config.json`.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub rislive: RisLiveConfig,
    pub validate_url: ValidatorEndpoint,
    pub ingest: IngestConfig,
    pub log: LogConfig,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RisLiveConfig {
    pub client_id: String,
    /// Seconds until the session deadline.
    pub duration: u64,
    pub only_ipv4: bool,
    pub filter: ClientDirective,
    pub url: Option<String>,
    pub read_timeout_secs: u64,
    pub heartbeat_secs: u64,
    pub queue_capacity: usize,
}

impl Default for RisLiveConfig {
    fn default() -> Self {
        let stream = StreamConfig::default();
        Self {
            client_id: "bgpvalidator".to_string(),
            duration: 3600,
            only_ipv4: false,
            filter: ClientDirective {
                host: Some("rrc00".to_string()),
                bgp_type: Some(BgpType::Update),
                require: Some(Require::Announcements),
            },
            url: None,
            read_timeout_secs: stream.read_timeout.as_secs(),
            heartbeat_secs: stream.heartbeat_interval.as_secs(),
            queue_capacity: stream.queue_capacity,
        }
    }
}

impl RisLiveConfig {
    pub fn feed_url(&self) -> String {
        self.url.clone().unwrap_or_else(|| subscribe_url(&self.client_id))
    }

    pub fn session_length(&self) -> Duration {
        Duration::from_secs(self.duration)
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            read_timeout: Duration::from_secs(self.read_timeout_secs.clamp(1, MAX_TIMER_SECS)),
            heartbeat_interval: Duration::from_secs(self.heartbeat_secs.clamp(1, MAX_TIMER_SECS)),
            queue_capacity: self.queue_capacity.max(1),
            ..StreamConfig::default()
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct IngestConfig {
    pub emit_policy: EmitPolicy,
    pub unknown_policy: UnknownPolicy,
    pub output: PathBuf,
    pub validator_timeout_secs: u64,
    pub validator_retries: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            emit_policy: EmitPolicy::default(),
            unknown_policy: UnknownPolicy::default(),
            output: PathBuf::from("result"),
            validator_timeout_secs: 10,
            validator_retries: 0,
        }
    }
}

impl IngestConfig {
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: Duration::from_secs(self.validator_timeout_secs.max(1)),
            max_retries: self.validator_retries,
            ..ClientOptions::default()
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub dir: PathBuf,
    pub level: String,
    /// Older log files kept next to the current one.
    pub keep: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./logs"),
            level: "info".to_string(),
            keep: 3,
        }
    }
}

impl AppConfig {
    /// Applies command line / environment values over the file values.
    pub fn apply(&mut self, args: &SubscribeArgs) {
        if let Some(client_id) = &args.client_id {
            self.rislive.client_id = client_id.clone();
        }
        self.rislive.duration = args.duration.unwrap_or(self.rislive.duration);
        self.rislive.only_ipv4 = args.only_ipv4.unwrap_or(self.rislive.only_ipv4);
        self.rislive.url = args.url.clone().or(self.rislive.url.take());
        self.ingest.emit_policy = args.emit_policy.unwrap_or(self.ingest.emit_policy);
        self.ingest.unknown_policy = args.unknown_policy.unwrap_or(self.ingest.unknown_policy);
        if let Some(output) = &args.output {
            self.ingest.output = output.clone();
        }
        if let Some(dir) = &args.log_dir {
            self.log.dir = dir.clone();
        }
        if let Some(level) = &args.log_level {
            self.log.level = level.clone();
        }
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            only_ipv4: self.rislive.only_ipv4,
            emit_policy: self.ingest.emit_policy,
            unknown_policy: self.ingest.unknown_policy,
        }
    }
}

/// Reads the configuration file.
///
/// An explicit path must exist. Without one, `./config.json` and then
/// `$HOME/config.json` are tried, and built-in defaults are used when neither
/// exists. Returns the file that was read, if any.
pub fn load_config(explicit: Option<&Path>) -> Result<(AppConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        return read_config(path).map(|config| (config, Some(path.to_path_buf())));
    }

    for path in default_locations() {
        if path.is_file() {
            let config = read_config(&path)?;
            return Ok((config, Some(path)));
        }
    }

    Ok((AppConfig::default(), None))
}

fn default_locations() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from(CONFIG_FILE)];
    if let Some(home_dir) = dirs::home_dir() {
        locations.push(home_dir.join(CONFIG_FILE));
    }
    locations
}

fn read_config(path: &Path) -> Result<AppConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse config file {}", path.display()))
}
