//! Server configuration: TOML file + CLI overrides.

use crate::tail::NotifierKind;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use wstail_core::{TailError, TailResult};

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub tail: TailSection,
    #[serde(default)]
    pub liveness: LivenessSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_route")]
    pub route: String,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Upgrades not finished within this many seconds are dropped.
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            route: default_route(),
            max_sessions: default_max_sessions(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
        }
    }
}

/// `[tail]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct TailSection {
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default)]
    pub notifier: NotifierKind,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for TailSection {
    fn default() -> Self {
        Self {
            path: default_path(),
            window: default_window(),
            notifier: NotifierKind::default(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// `[liveness]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct LivenessSection {
    #[serde(default = "default_pong_wait_secs")]
    pub pong_wait_secs: u64,
    /// Defaults to 9/10 of `pong_wait_secs`.
    #[serde(default)]
    pub ping_period_secs: Option<u64>,
    #[serde(default = "default_write_wait_secs")]
    pub write_wait_secs: u64,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl Default for LivenessSection {
    fn default() -> Self {
        Self {
            pong_wait_secs: default_pong_wait_secs(),
            ping_period_secs: None,
            write_wait_secs: default_write_wait_secs(),
            max_message_size: default_max_message_size(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_route() -> String {
    "/logs".to_string()
}
fn default_max_sessions() -> usize {
    100
}
fn default_handshake_timeout_secs() -> u64 {
    15
}
fn default_path() -> String {
    "./test.log".to_string()
}
fn default_window() -> usize {
    10
}
fn default_poll_interval_ms() -> u64 {
    250
}
fn default_pong_wait_secs() -> u64 {
    60
}
fn default_write_wait_secs() -> u64 {
    10
}
fn default_max_message_size() -> usize {
    512
}

/// Values given on the command line; `None` keeps the file/default value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub listen: Option<String>,
    pub route: Option<String>,
    pub file: Option<String>,
    pub window: Option<usize>,
    pub notifier: Option<NotifierKind>,
    pub max_sessions: Option<usize>,
}

/// What a session tails and how.
#[derive(Debug, Clone)]
pub struct TailSettings {
    pub path: PathBuf,
    pub window: usize,
    pub notifier: NotifierKind,
    pub poll_interval: Duration,
}

/// Probe, deadline and inbound-limit timings for a session.
#[derive(Debug, Clone)]
pub struct LivenessSettings {
    pub pong_wait: Duration,
    pub ping_period: Duration,
    pub write_wait: Duration,
    pub max_message_size: usize,
}

/// Resolved server configuration (paths expanded, CLI overrides applied).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub route: String,
    pub max_sessions: usize,
    pub handshake_timeout: Duration,
    pub tail: TailSettings,
    pub liveness: LivenessSettings,
}

impl ServerConfig {
    /// Load config from TOML file, then apply CLI overrides.
    pub fn load(config_path: Option<&Path>, overrides: Overrides) -> TailResult<Self> {
        let file_config = if let Some(path) = config_path {
            let expanded = expand_tilde(path);
            if expanded.exists() {
                info!(path = %expanded.display(), "loading config file");
                let content = std::fs::read_to_string(&expanded)?;
                parse(&content)?
            } else {
                info!(path = %expanded.display(), "config file not found, using defaults");
                ConfigFile::default()
            }
        } else {
            ConfigFile::default()
        };

        Self::resolve(file_config, overrides)
    }

    /// Merge CLI overrides into a parsed file and validate the result.
    pub fn resolve(file: ConfigFile, overrides: Overrides) -> TailResult<Self> {
        let listen_str = overrides.listen.unwrap_or(file.server.listen);
        let listen: SocketAddr = listen_str
            .parse()
            .map_err(|e| TailError::Config(format!("invalid listen address {listen_str:?}: {e}")))?;
        let route = overrides.route.unwrap_or(file.server.route);
        let path = overrides.file.unwrap_or(file.tail.path);

        let pong_wait = Duration::from_secs(file.liveness.pong_wait_secs);
        let ping_period = match file.liveness.ping_period_secs {
            Some(secs) => Duration::from_secs(secs),
            None => pong_wait
                .checked_mul(9)
                .map(|d| d / 10)
                .ok_or_else(|| TailError::Config("liveness.pong_wait_secs is too large".into()))?,
        };

        let config = Self {
            listen,
            route,
            max_sessions: overrides.max_sessions.unwrap_or(file.server.max_sessions),
            handshake_timeout: Duration::from_secs(file.server.handshake_timeout_secs),
            tail: TailSettings {
                path: expand_tilde_str(&path),
                window: overrides.window.unwrap_or(file.tail.window),
                notifier: overrides.notifier.unwrap_or(file.tail.notifier),
                poll_interval: Duration::from_millis(file.tail.poll_interval_ms),
            },
            liveness: LivenessSettings {
                pong_wait,
                ping_period,
                write_wait: Duration::from_secs(file.liveness.write_wait_secs),
                max_message_size: file.liveness.max_message_size,
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> TailResult<()> {
        let fail = |msg: String| -> TailResult<()> { Err(TailError::Config(msg)) };
        if !self.route.starts_with('/') {
            return fail(format!("route must start with '/': {:?}", self.route));
        }
        if self.max_sessions == 0 {
            return fail("max_sessions must be at least 1".into());
        }
        if self.handshake_timeout.is_zero() {
            return fail("server.handshake_timeout_secs must be positive".into());
        }
        if self.tail.window == 0 {
            return fail("tail.window must be at least 1".into());
        }
        if self.tail.poll_interval.is_zero() {
            return fail("tail.poll_interval_ms must be positive".into());
        }
        let live = &self.liveness;
        if live.pong_wait.is_zero() || live.write_wait.is_zero() || live.ping_period.is_zero() {
            return fail("liveness timings must be positive".into());
        }
        // Probes must leave at least a 10% margin before the peer's read deadline.
        let (Some(ping_tenths), Some(budget)) =
            (live.ping_period.checked_mul(10), live.pong_wait.checked_mul(9))
        else {
            return fail("liveness timings are too large".into());
        };
        if ping_tenths > budget {
            return fail(format!(
                "ping period {:?} exceeds 90% of pong wait {:?}",
                live.ping_period, live.pong_wait
            ));
        }
        if live.max_message_size == 0 {
            return fail("liveness.max_message_size must be at least 1".into());
        }
        Ok(())
    }
}

fn parse(content: &str) -> TailResult<ConfigFile> {
    toml::from_str::<ConfigFile>(content)
        .map_err(|e| TailError::Config(format!("config parse error: {e}")))
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_reference_behaviour() {
        let cfg = ServerConfig::resolve(ConfigFile::default(), Overrides::default()).unwrap();
        assert_eq!(cfg.listen, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(cfg.route, "/logs");
        assert_eq!(cfg.handshake_timeout, Duration::from_secs(15));
        assert_eq!(cfg.tail.path, PathBuf::from("./test.log"));
        assert_eq!(cfg.tail.window, 10);
        assert_eq!(cfg.tail.notifier, NotifierKind::Native);
        assert_eq!(cfg.liveness.pong_wait, Duration::from_secs(60));
        assert_eq!(cfg.liveness.ping_period, Duration::from_secs(54));
        assert_eq!(cfg.liveness.write_wait, Duration::from_secs(10));
        assert_eq!(cfg.liveness.max_message_size, 512);
    }

    #[test]
    fn file_values_and_cli_overrides() {
        let file = parse(
            r#"
            [server]
            listen = "127.0.0.1:9000"
            max_sessions = 4
            handshake_timeout_secs = 3

            [tail]
            path = "/var/log/app.log"
            window = 50
            notifier = "poll"
            poll_interval_ms = 100

            [liveness]
            pong_wait_secs = 30
            write_wait_secs = 5
            "#,
        )
        .unwrap();

        let cfg = ServerConfig::resolve(
            file,
            Overrides {
                window: Some(25),
                route: Some("/tail".into()),
                ..Overrides::default()
            },
        )
        .unwrap();

        assert_eq!(cfg.listen.port(), 9000);
        assert_eq!(cfg.route, "/tail");
        assert_eq!(cfg.max_sessions, 4);
        assert_eq!(cfg.handshake_timeout, Duration::from_secs(3));
        assert_eq!(cfg.tail.path, PathBuf::from("/var/log/app.log"));
        assert_eq!(cfg.tail.window, 25);
        assert_eq!(cfg.tail.notifier, NotifierKind::Poll);
        assert_eq!(cfg.tail.poll_interval, Duration::from_millis(100));
        assert_eq!(cfg.liveness.ping_period, Duration::from_secs(27));
        assert_eq!(cfg.liveness.write_wait, Duration::from_secs(5));
    }

    #[test]
    fn ping_period_must_leave_margin() {
        let mut file = ConfigFile::default();
        file.liveness.ping_period_secs = Some(55);
        let err = ServerConfig::resolve(file, Overrides::default()).unwrap_err();
        assert!(matches!(err, TailError::Config(_)));

        let mut file = ConfigFile::default();
        file.liveness.ping_period_secs = Some(54);
        assert!(ServerConfig::resolve(file, Overrides::default()).is_ok());
    }

    #[test]
    fn huge_timings_are_rejected_not_overflowed() {
        let mut file = ConfigFile::default();
        file.liveness.pong_wait_secs = u64::MAX;
        let err = ServerConfig::resolve(file, Overrides::default()).unwrap_err();
        assert!(matches!(err, TailError::Config(_)));

        let mut file = ConfigFile::default();
        file.liveness.pong_wait_secs = u64::MAX;
        file.liveness.ping_period_secs = Some(1);
        let err = ServerConfig::resolve(file, Overrides::default()).unwrap_err();
        assert!(matches!(err, TailError::Config(_)));

        let mut file = ConfigFile::default();
        file.liveness.ping_period_secs = Some(u64::MAX);
        let err = ServerConfig::resolve(file, Overrides::default()).unwrap_err();
        assert!(matches!(err, TailError::Config(_)));
    }

    #[test]
    fn zero_handshake_timeout_is_rejected() {
        let mut file = ConfigFile::default();
        file.server.handshake_timeout_secs = 0;
        assert!(matches!(
            ServerConfig::resolve(file, Overrides::default()),
            Err(TailError::Config(_))
        ));
    }

    #[test]
    fn rejects_bad_values() {
        let zero_window = Overrides {
            window: Some(0),
            ..Overrides::default()
        };
        assert!(ServerConfig::resolve(ConfigFile::default(), zero_window).is_err());

        let bad_route = Overrides {
            route: Some("logs".into()),
            ..Overrides::default()
        };
        assert!(ServerConfig::resolve(ConfigFile::default(), bad_route).is_err());

        let bad_addr = Overrides {
            listen: Some("not-an-addr".into()),
            ..Overrides::default()
        };
        assert!(ServerConfig::resolve(ConfigFile::default(), bad_addr).is_err());
    }

    #[test]
    fn unparsable_file_is_an_error() {
        assert!(matches!(parse("[tail\nwindow = "), Err(TailError::Config(_))));
        assert!(matches!(
            parse("[tail]\nnotifier = \"carrier-pigeon\""),
            Err(TailError::Config(_))
        ));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg =
            ServerConfig::load(Some(&dir.path().join("absent.toml")), Overrides::default()).unwrap();
        assert_eq!(cfg.tail.window, 10);
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[tail]\nwindow = 3").unwrap();
        let cfg = ServerConfig::load(Some(file.path()), Overrides::default()).unwrap();
        assert_eq!(cfg.tail.window, 3);
    }
}
