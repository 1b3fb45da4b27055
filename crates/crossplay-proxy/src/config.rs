use crossplay_types::ProtocolVersion;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Address of the backend server, `host:port`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Protocol revision the backend speaks.
    #[serde(default = "default_server_protocol")]
    pub server_protocol: ProtocolVersion,
    /// Keep connections alive after a packet fault instead of disconnecting.
    #[serde(default)]
    pub tolerant: bool,
    #[serde(default = "default_registry_dir")]
    pub registry_dir: PathBuf,
    /// When set, write the loaded registry snapshots here and exit.
    #[serde(default)]
    pub dump_dir: Option<PathBuf>,
    #[serde(default = "default_report_queue")]
    pub report_queue: usize,
    /// Compression threshold in effect before the server negotiates one.
    #[serde(default)]
    pub compression_threshold: Option<i32>,
}

fn default_bind() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    25565
}

fn default_backend() -> String {
    "127.0.0.1:25566".into()
}

fn default_server_protocol() -> ProtocolVersion {
    ProtocolVersion::V1_20
}

fn default_registry_dir() -> PathBuf {
    PathBuf::from("registries")
}

fn default_report_queue() -> usize {
    64
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            backend: default_backend(),
            server_protocol: default_server_protocol(),
            tolerant: false,
            registry_dir: default_registry_dir(),
            dump_dir: None,
            report_queue: default_report_queue(),
            compression_threshold: None,
        }
    }
}

impl ProxyConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: ProxyConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            tracing::info!("No config file found at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }
}
