use std::collections::HashMap;

use tracing::trace;

/// Top-level configuration file contents
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Glob patterns for template files shared by all receivers
    #[serde(default)]
    pub templates: Vec<String>,

    #[serde(default)]
    pub receivers: Vec<Receiver>,
}

/// A named route from an Alertmanager receiver to Signal recipients
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Receiver {
    pub name: String,

    /// Signal account messages are sent from
    #[serde(default)]
    pub sender: String,

    /// Recipient address templates, rendered per alert. The rendered value
    /// must carry a `tel:` or `group:` prefix.
    #[serde(default)]
    pub to: Vec<String>,

    /// Template source for the message body
    #[serde(default)]
    pub template: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("unable to parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("no receivers defined")]
    NoReceivers,

    #[error("receiver missing 'name:'")]
    UnnamedReceiver,

    #[error("duplicate receiver name: {0:?}")]
    DuplicateReceiver(String),

    #[error("error parsing templates: {0}")]
    Templates(#[from] tera::Error),
}

pub fn read_config_file(path: &str) -> Result<Config, ConfigError> {
    let file_content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    let config: Config =
        serde_yaml::from_str(&file_content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
    trace!("loaded config: {config:?}");
    Ok(config)
}

impl Config {
    /// Build the receiver lookup map, validating what operators get wrong:
    /// missing names and duplicate names. Everything else (empty sender,
    /// empty recipient list, empty template) only fails at render or send
    /// time.
    pub fn receiver_map(&self) -> Result<HashMap<String, Receiver>, ConfigError> {
        if self.receivers.is_empty() {
            return Err(ConfigError::NoReceivers);
        }

        let mut receivers = HashMap::new();
        for receiver in &self.receivers {
            if receiver.name.is_empty() {
                return Err(ConfigError::UnnamedReceiver);
            }
            if receivers
                .insert(receiver.name.clone(), receiver.clone())
                .is_some()
            {
                return Err(ConfigError::DuplicateReceiver(receiver.name.clone()));
            }
        }
        Ok(receivers)
    }
}
