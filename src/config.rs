//! Configuration loading and readiness validation.
//!
//! All keys have serde defaults so a sparse file still deserializes; the
//! required keys are checked by [`Config::ready_errors`] instead, which lets
//! the bot degrade to a not-ready state (log and refuse to start) rather
//! than crash on a missing credential.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Relay server endpoint and credentials.
    #[serde(default)]
    pub server: ServerConfig,
    /// Bot identity and dispatch settings.
    #[serde(default)]
    pub bot: BotConfig,
    /// Outbound rate limits and timers.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Plugin selection and per-plugin setting overrides.
    #[serde(default)]
    pub plugins: PluginsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Everything that prevents the client from starting.
    ///
    /// An empty result means ready. Anything listed here is reported and the
    /// client refuses to connect, per the configuration-error taxonomy.
    pub fn ready_errors(&self) -> Vec<&'static str> {
        let mut errors = Vec::new();
        if self.server.nick.is_empty() {
            errors.push("server.nick is not set");
        }
        if self.server.pass.is_empty() {
            errors.push("server.pass is not set");
        }
        if self.bot.channel.is_empty() {
            errors.push("bot.channel is not set");
        } else if !self.bot.channel.starts_with('#') {
            errors.push("bot.channel must start with '#'");
        }
        if self.bot.admins.is_empty() {
            errors.push("bot.admins is empty");
        }
        if self.bot.prefix.chars().count() != 1 {
            errors.push("bot.prefix must be a single character");
        }
        errors
    }
}

/// Relay endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Relay hostname.
    #[serde(default = "default_host")]
    pub host: String,
    /// Relay port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Whether to wrap the connection in TLS.
    #[serde(default = "default_tls")]
    pub tls: bool,
    /// Login nickname.
    #[serde(default)]
    pub nick: String,
    /// Auth token sent as the connection password.
    #[serde(default)]
    pub pass: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tls: default_tls(),
            nick: String::new(),
            pass: String::new(),
        }
    }
}

/// Bot identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Command prefix (a single character, e.g. "!").
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Home channel joined at startup.
    #[serde(default)]
    pub channel: String,
    /// Nicknames allowed to run commands. Compared case-insensitively;
    /// the relay lowercases login names.
    #[serde(default)]
    pub admins: Vec<String>,
    /// Optional announcement sent to the home channel once per handshake.
    #[serde(default)]
    pub greeting: Option<String>,
    /// Quit reason used for the best-effort farewell.
    #[serde(default = "default_farewell")]
    pub farewell: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            channel: String::new(),
            admins: Vec::new(),
            greeting: None,
            farewell: default_farewell(),
        }
    }
}

impl BotConfig {
    /// The prefix as a char; validated single-character by `ready_errors`.
    pub fn prefix_char(&self) -> char {
        self.prefix.chars().next().unwrap_or('!')
    }
}

/// Outbound rate limits and timers.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum privileged sends per rolling 30-second window.
    #[serde(default = "default_privmsg_per_30")]
    pub privmsg_per_30: u32,
    /// Minimum interval between connection-affecting calls, in seconds.
    #[serde(default = "default_control_interval")]
    pub control_interval_secs: u64,
    /// Keep-alive ping period, in seconds.
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,
    /// Delay before retrying a deferred send or a failed connect, in seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            privmsg_per_30: default_privmsg_per_30(),
            control_interval_secs: default_control_interval(),
            keepalive_secs: default_keepalive(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

/// Plugin configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginsConfig {
    /// Plugins to enable, in registration order.
    #[serde(default = "default_enabled_plugins")]
    pub enabled: Vec<String>,
    /// Per-plugin setting overrides, keyed by plugin id then setting key.
    #[serde(default)]
    pub settings: HashMap<String, toml::value::Table>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_plugins(),
            settings: HashMap::new(),
        }
    }
}

fn default_host() -> String {
    "irc.chat.twitch.tv".to_string()
}

fn default_port() -> u16 {
    6697
}

fn default_tls() -> bool {
    true
}

fn default_prefix() -> String {
    "!".to_string()
}

fn default_farewell() -> String {
    "straybot signing off".to_string()
}

fn default_privmsg_per_30() -> u32 {
    90
}

fn default_control_interval() -> u64 {
    2
}

fn default_keepalive() -> u64 {
    30
}

fn default_retry_delay() -> u64 {
    2
}

fn default_enabled_plugins() -> Vec<String> {
    vec!["echo".to_string(), "eightball".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL: &str = r##"
        [server]
        host = "127.0.0.1"
        port = 6667
        tls = false
        nick = "straybot"
        pass = "oauth:token"

        [bot]
        prefix = "!"
        channel = "#straylight"
        admins = ["alice", "bob"]
        greeting = "reporting for duty"

        [limits]
        privmsg_per_30 = 20

        [plugins]
        enabled = ["echo"]

        [plugins.settings.echo]
        online_global_cd = 10
    "##;

    #[test]
    fn parses_full_config() {
        let config: Config = toml::from_str(FULL).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(!config.server.tls);
        assert_eq!(config.bot.admins.len(), 2);
        assert_eq!(config.limits.privmsg_per_30, 20);
        // Unset limits keep their defaults.
        assert_eq!(config.limits.keepalive_secs, 30);
        assert_eq!(config.plugins.enabled, vec!["echo"]);
        assert!(config.ready_errors().is_empty());
    }

    #[test]
    fn missing_credentials_degrade_to_not_ready() {
        let config: Config = toml::from_str("[server]\nhost = \"example.com\"\n").unwrap();
        let errors = config.ready_errors();
        assert!(errors.contains(&"server.nick is not set"));
        assert!(errors.contains(&"server.pass is not set"));
        assert!(errors.contains(&"bot.channel is not set"));
    }

    #[test]
    fn channel_without_hash_is_rejected() {
        let mut config: Config = toml::from_str(FULL).unwrap();
        config.bot.channel = "straylight".to_string();
        assert!(
            config
                .ready_errors()
                .contains(&"bot.channel must start with '#'")
        );
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.nick, "straybot");
    }

    #[test]
    fn load_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"server = 3").unwrap();

        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
