use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::{Path, PathBuf}};
use tokio::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct KernelConfig {
    pub listen: String,
    /// Dossier de persistence du store (None = mémoire seule)
    pub data_dir: Option<PathBuf>,
    /// Nom du realm racine créé au boot
    pub root_realm: String,
    pub mqtt: Option<MqttConf>,
    pub livesynthesis: LivesynthesisConf,
    /// api key -> utilisateur
    pub users: HashMap<String, UserConf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct LivesynthesisConf {
    /// Nombre de snapshots conservés par realm
    pub history_size: usize,
    pub history_interval_secs: u64,
}

impl Default for LivesynthesisConf {
    fn default() -> Self {
        Self { history_size: 60, history_interval_secs: 60 }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct UserConf {
    pub name: String,
    pub admin: bool,
    /// Noms des realms lisibles
    pub realms: Vec<String>,
    /// Lecture étendue aux sous-realms
    pub sub_realms: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".into(),
            data_dir: None,
            root_realm: "All".into(),
            mqtt: None,
            livesynthesis: LivesynthesisConf::default(),
            users: HashMap::new(),
        }
    }
}

pub fn parse_config(txt: &str) -> Result<KernelConfig, serde_yaml::Error> {
    if txt.trim().is_empty() {
        return Ok(KernelConfig::default());
    }
    serde_yaml::from_str(txt)
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("SYMBION_LIVESTATE_CONFIG").unwrap_or_else(|_| "livestate.yaml".into());
    if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        parse_config(&txt).unwrap_or_else(|e| {
            tracing::warn!(%path, error = %e, "invalid config, using defaults");
            KernelConfig::default()
        })
    } else {
        tracing::warn!(%path, "no config file, using defaults");
        KernelConfig::default()
    }
}
