//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/treemodel/treemodel.toml`
//! 3. Local config: `--config <FILE>` or `./.treemodel.toml`
//! 4. Environment variables: `TREEMODEL_*` prefix

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::application::command::CommandConfig;
use crate::application::features::EditableOptions;
use crate::application::ApplicationError;
use crate::domain::{CommandKind, NodeData, NodeState};
use crate::infrastructure::Method;

/// Remote call settings for one command kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct CommandSettings {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<Method>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Static params merged under every request of this kind
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl CommandSettings {
    /// Overlay fields win when specified; params merge key by key.
    fn merge(&self, overlay: &RawCommandSettings) -> Self {
        let mut params = self.params.clone();
        if let Some(extra) = &overlay.params {
            params.extend(extra.clone());
        }
        Self {
            url: overlay.url.clone().unwrap_or_else(|| self.url.clone()),
            method: overlay.method.or(self.method),
            content_type: overlay
                .content_type
                .clone()
                .or_else(|| self.content_type.clone()),
            params,
        }
    }

    pub fn to_command_config(&self) -> CommandConfig {
        let mut config = CommandConfig::new(self.url.clone());
        if let Some(method) = self.method {
            config = config.method(method);
        }
        if let Some(content_type) = &self.content_type {
            config = config.content_type(content_type.clone());
        }
        if !self.params.is_empty() {
            let params: NodeData = self
                .params
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            config = config.params(params);
        }
        config
    }
}

/// Raw command settings for intermediate parsing.
///
/// `None` means "not specified, inherit from the layer below".
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawCommandSettings {
    pub url: Option<String>,
    pub method: Option<Method>,
    pub content_type: Option<String>,
    pub params: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawEditableSettings {
    pub data_key: Option<String>,
    pub default_value: Option<String>,
}

/// Raw settings for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub default_state: Option<NodeState>,
    pub load_root: Option<bool>,
    pub editable: RawEditableSettings,
    pub commands: BTreeMap<String, RawCommandSettings>,
}

/// Unified configuration for treemodel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// State of new non-leaf nodes (`expanded` or `collapsed`)
    pub default_state: NodeState,
    /// Fetch the root's children through the read command on start
    pub load_root: bool,
    pub editable: EditableOptions,
    /// Keyed by command kind (`create`, `read`, ...)
    pub commands: BTreeMap<String, CommandSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_state: NodeState::Collapsed,
            load_root: true,
            editable: EditableOptions::default(),
            commands: BTreeMap::new(),
        }
    }
}

/// Get the XDG config directory for treemodel.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "treemodel").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("treemodel.toml"))
}

/// Local config looked up in the working directory when `--config` is absent.
pub fn local_config_path() -> PathBuf {
    PathBuf::from(".treemodel.toml")
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

impl Settings {
    /// Merge overlay config onto self (base).
    ///
    /// Scalars: overlay wins if Some. Commands: merged per kind, per field.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        let mut commands = self.commands.clone();
        for (kind, raw) in &overlay.commands {
            let merged = commands.get(kind).cloned().unwrap_or_default().merge(raw);
            commands.insert(kind.clone(), merged);
        }
        Self {
            default_state: overlay.default_state.unwrap_or(self.default_state),
            load_root: overlay.load_root.unwrap_or(self.load_root),
            editable: EditableOptions {
                data_key: overlay
                    .editable
                    .data_key
                    .clone()
                    .unwrap_or_else(|| self.editable.data_key.clone()),
                default_value: overlay
                    .editable
                    .default_value
                    .clone()
                    .unwrap_or_else(|| self.editable.default_value.clone()),
            },
            commands,
        }
    }

    /// Load settings with layered precedence.
    ///
    /// An explicit `config_file` must exist; otherwise `./.treemodel.toml` is
    /// used when present.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ApplicationError> {
        let local = match config_file {
            Some(path) if !path.exists() => {
                return Err(ApplicationError::Config {
                    message: format!("config file not found: {}", path.display()),
                })
            }
            Some(path) => Some(path.to_path_buf()),
            None => Some(local_config_path()).filter(|p| p.exists()),
        };
        let global = global_config_path().filter(|p| p.exists());

        let settings = Self::load_layers(global.as_deref(), local.as_deref())?;
        Self::apply_env_overrides(settings)
    }

    /// Defaults, then `global`, then `local`. No environment overrides.
    pub fn load_layers(global: Option<&Path>, local: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();
        for path in [global, local].into_iter().flatten() {
            let raw = load_raw_settings(path)?;
            current = current.merge_with(&raw);
        }
        current.validate()?;
        Ok(current)
    }

    fn validate(&self) -> Result<(), ApplicationError> {
        if self.default_state == NodeState::Leaf {
            return Err(ApplicationError::Config {
                message: "default_state must be expanded or collapsed".into(),
            });
        }
        for kind in self.commands.keys() {
            if CommandKind::from_name(kind).is_none() {
                return Err(ApplicationError::Config {
                    message: format!("unknown command kind: {}", kind),
                });
            }
        }
        Ok(())
    }

    /// Apply TREEMODEL_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(Environment::with_prefix("TREEMODEL").separator("__"))
            .build()
            .map_err(config_err)?;

        if let Ok(val) = config.get::<NodeState>("default_state") {
            settings.default_state = val;
        }
        if let Ok(val) = config.get_bool("load_root") {
            settings.load_root = val;
        }
        if let Ok(val) = config.get_string("editable.data_key") {
            settings.editable.data_key = val;
        }
        if let Ok(val) = config.get_string("editable.default_value") {
            settings.editable.default_value = val;
        }
        for kind in CommandKind::ALL {
            let key = kind.as_str();
            if let Ok(val) = config.get_string(&format!("commands.{}.url", key)) {
                settings.commands.entry(key.to_string()).or_default().url = val;
            }
            if let Ok(val) = config.get_string(&format!("commands.{}.method", key)) {
                let method = val
                    .parse::<Method>()
                    .map_err(|message| ApplicationError::Config { message })?;
                settings.commands.entry(key.to_string()).or_default().method = Some(method);
            }
            if let Ok(val) = config.get_string(&format!("commands.{}.content_type", key)) {
                settings.commands.entry(key.to_string()).or_default().content_type = Some(val);
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Command descriptors for every configured kind with a non-empty url.
    pub fn command_configs(&self) -> Vec<(CommandKind, CommandConfig)> {
        self.commands
            .iter()
            .filter(|(_, cmd)| !cmd.url.is_empty())
            .filter_map(|(kind, cmd)| {
                CommandKind::from_name(kind).map(|kind| (kind, cmd.to_command_config()))
            })
            .collect()
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# treemodel configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/treemodel/treemodel.toml
#   Local:  --config <FILE> or ./.treemodel.toml
#   Env:    TREEMODEL_* environment variables, e.g. TREEMODEL_COMMANDS__READ__URL

# State of new non-leaf nodes: "expanded" or "collapsed"
# default_state = "collapsed"

# Load the first tree level through the read command on start
# load_root = true

[editable]
# data_key = "text"
# default_value = ""

# One table per gated command: create, read, update, remove,
# remove_all_children, move
# [commands.read]
# url = "https://example.com/api/tree"
# method = "GET"
# content_type = "application/json"
# params = { token = "abc" }
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
