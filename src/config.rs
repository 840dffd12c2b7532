use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub labels: LabelProviderConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Scoring and learning parameters.
#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    /// Lower weight bound. Repeated penalties can never push a keyword
    /// below this.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Upper weight bound. Repeated rewards saturate here.
    #[serde(default = "default_max_weight")]
    pub max_weight: f64,
    /// Step size applied per matched keyword on feedback.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            epsilon: default_epsilon(),
            max_weight: default_max_weight(),
            learning_rate: default_learning_rate(),
        }
    }
}

fn default_epsilon() -> f64 {
    0.01
}
fn default_max_weight() -> f64 {
    10.0
}
fn default_learning_rate() -> f64 {
    0.05
}

#[derive(Debug, Deserialize, Clone)]
pub struct LabelProviderConfig {
    /// Provider kind: `static`, `remote`, or `disabled`.
    #[serde(default = "default_label_provider")]
    pub provider: String,
    /// Endpoint of the remote detector. Required when provider is `remote`.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Fixed labels returned by the `static` provider.
    #[serde(default = "default_static_labels")]
    pub static_labels: Vec<StaticLabel>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LabelProviderConfig {
    fn default() -> Self {
        Self {
            provider: default_label_provider(),
            endpoint: None,
            static_labels: default_static_labels(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StaticLabel {
    pub label: String,
    #[serde(default = "default_static_confidence")]
    pub confidence: f64,
}

fn default_label_provider() -> String {
    "static".to_string()
}

fn default_static_labels() -> Vec<StaticLabel> {
    ["yoga", "mat", "exercise", "purple", "fitness"]
        .iter()
        .map(|l| StaticLabel {
            label: l.to_string(),
            confidence: default_static_confidence(),
        })
        .collect()
}

fn default_static_confidence() -> f64 {
    0.9
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory where uploaded product images are stored.
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            image_dir: default_image_dir(),
        }
    }
}

fn default_image_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

impl LabelProviderConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate classifier bounds
    if config.classifier.epsilon <= 0.0 {
        anyhow::bail!("classifier.epsilon must be > 0");
    }
    if config.classifier.max_weight <= config.classifier.epsilon {
        anyhow::bail!("classifier.max_weight must be > classifier.epsilon");
    }
    if config.classifier.learning_rate <= 0.0 {
        anyhow::bail!("classifier.learning_rate must be > 0");
    }

    // Validate label provider
    match config.labels.provider.as_str() {
        "static" | "remote" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown label provider: '{}'. Must be static, remote, or disabled.",
            other
        ),
    }
    if config.labels.provider == "remote" && config.labels.endpoint.is_none() {
        anyhow::bail!("labels.endpoint must be set when provider is 'remote'");
    }
    for l in &config.labels.static_labels {
        if !(0.0..=1.0).contains(&l.confidence) {
            anyhow::bail!(
                "labels.static_labels confidence for '{}' must be in [0.0, 1.0]",
                l.label
            );
        }
    }

    Ok(config)
}
