//! Configuration file handling.
//!
//! The configuration is a TOML file in which every table and field is optional. Missing fields
//! take the defaults documented on the respective field.

use std::{
    fmt, io,
    net::SocketAddr,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Default path of the configuration file, relative to the working directory.
pub const DEFAULT_PATH: &str = "palm-alert.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}'", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config file '{}'", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub model: ModelConfig,
    pub server: ServerConfig,
    pub mqtt: MqttConfig,
    pub alert: AlertConfig,
    pub live: LiveConfig,
}

impl Config {
    /// Reads and parses the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        text.parse().map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Like [`Config::load`], but falls back to the default configuration if `path` does not
    /// exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match Self::load(path.as_ref()) {
            Err(ConfigError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                log::info!(
                    "no config file at '{}', using defaults",
                    path.as_ref().display()
                );
                Ok(Self::default())
            }
            res => res,
        }
    }
}

impl FromStr for Config {
    type Err = toml::de::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Path to the hand landmark ONNX network. Default: `hand_landmark_full.onnx`.
    pub path: PathBuf,
    /// Minimum presence score for a hand to be reported. Default: 0.5.
    pub presence_threshold: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("hand_landmark_full.onnx"),
            presence_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the HTTP server binds to. Default: `0.0.0.0:8000`.
    pub listen: SocketAddr,
    /// Maximum accepted request body size. Default: 10 MiB.
    pub max_upload_bytes: usize,
    /// Response message returned when an open hand was detected and the alert was sent.
    pub response_message: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8000)),
            max_upload_bytes: 10 * 1024 * 1024,
            response_message: crate::pipeline::OPEN_PALM.into(),
        }
    }
}

#[derive(Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MqttConfig {
    /// If `false`, alerts are only logged. Default: `true`.
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub topic: String,
    pub keep_alive_secs: u64,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".into(),
            port: 1883,
            client_id: "ai-hand-detector".into(),
            topic: "atm/warn".into(),
            keep_alive_secs: 60,
            username: None,
            password: None,
        }
    }
}

// Keeps the password out of logs.
impl fmt::Debug for MqttConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttConfig")
            .field("enabled", &self.enabled)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("topic", &self.topic)
            .field("keep_alive_secs", &self.keep_alive_secs)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlertConfig {
    /// Human-readable message carried by every alert.
    pub message: String,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            message: crate::alert::DEFAULT_MESSAGE.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LiveConfig {
    /// Where frames come from. Default: the first local webcam.
    pub source: LiveSource,
    /// Name of the webcam to open. `PALM_ALERT_WEBCAM_NAME` takes precedence.
    pub webcam_name: Option<String>,
    /// Requested webcam resolution. The camera may deliver a different one.
    pub width: u32,
    pub height: u32,
    pub show_window: bool,
    /// Whether the live loop publishes alerts, in addition to logging them.
    pub publish_alerts: bool,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            source: LiveSource::Webcam,
            webcam_name: None,
            width: 640,
            height: 480,
            show_window: true,
            publish_alerts: false,
        }
    }
}

/// Frame source of the live loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveSource {
    /// A local V4L2 webcam.
    Webcam,
    /// An MJPEG stream served over HTTP, such as the ESP32-CAM's `http://<ip>:81/stream`.
    Http { host: String, port: u16, path: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid frame source '{0}' (expected `webcam` or `http://host[:port]/path`)")]
pub struct InvalidSource(String);

impl FromStr for LiveSource {
    type Err = InvalidSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "webcam" {
            return Ok(Self::Webcam);
        }

        let err = || InvalidSource(s.to_string());
        let rest = s.strip_prefix("http://").ok_or_else(err)?;
        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };
        // IPv6 addresses are bracketed: `[::1]:81`.
        let (host, port) = match authority.strip_prefix('[') {
            Some(rest) => {
                let (host, port) = rest.split_once(']').ok_or_else(err)?;
                match port {
                    "" => (host, 80),
                    port => {
                        let port = port.strip_prefix(':').ok_or_else(err)?;
                        (host, port.parse().map_err(|_| err())?)
                    }
                }
            }
            None => match authority.rsplit_once(':') {
                Some((host, port)) => (host, port.parse().map_err(|_| err())?),
                None => (authority, 80),
            },
        };
        if host.is_empty() {
            return Err(err());
        }

        Ok(Self::Http {
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }
}

impl fmt::Display for LiveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Webcam => f.write_str("webcam"),
            Self::Http { host, port, path } if host.contains(':') => {
                write!(f, "http://[{host}]:{port}{path}")
            }
            Self::Http { host, port, path } => write!(f, "http://{host}:{port}{path}"),
        }
    }
}

impl<'de> Deserialize<'de> for LiveSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
