use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

use crate::colorize::{ColorRules, ColorizingRule, parse_color};
use crate::fields::LogFields;
use crate::filter::{
    DEFAULT_MAX_DEPTH, FilterLibrary, FilterParseError, FilterParser, FilterRule, LibraryError,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Saved filter '{name}' does not parse: {source}")]
    InvalidFilter {
        name: String,
        #[source]
        source: FilterParseError,
    },
    #[error("Color rule '{name}' does not parse: {source}")]
    InvalidColorRule {
        name: String,
        #[source]
        source: FilterParseError,
    },
    #[error("Color rule '{name}' uses unknown color '{color}'")]
    UnknownColor { name: String, color: String },
    #[error(transparent)]
    Library(#[from] LibraryError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Free-form label for the loaded profile.
    pub profile_name: String,
    pub evaluation: EvaluationRules,
    pub fields: FieldRules,
    /// Saved filters, loaded into the library in order
    pub filters: Vec<SavedFilter>,
    pub color_rules: Vec<SavedColorRule>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            profile_name: "base".to_string(),
            evaluation: EvaluationRules::default(),
            fields: FieldRules::default(),
            filters: Vec::new(),
            color_rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationRules {
    /// Maximum nesting of expressions plus alias chain length
    pub max_depth: usize,
}

impl Default for EvaluationRules {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldRules {
    /// Text fields compared without regard to case
    pub case_insensitive: Vec<String>,
}

impl Default for FieldRules {
    fn default() -> Self {
        Self {
            case_insensitive: vec!["level".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedFilter {
    pub name: String,
    pub filter: String,
}

/// A colorizing rule as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedColorRule {
    pub name: String,
    pub filter: String,
    #[serde(default)]
    pub foreground: Option<String>,
    #[serde(default)]
    pub background: Option<String>,
    /// Lower values win
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl FilterConfig {
    pub fn log_fields(&self) -> LogFields {
        LogFields::with_case_insensitive(self.fields.case_insensitive.iter().cloned())
    }

    /// Parse every saved filter into a new library
    ///
    /// A saved filter may only reference filters defined above it.
    pub fn build_library(&self, fields: &LogFields) -> Result<FilterLibrary, ConfigError> {
        let library = FilterLibrary::new();
        for saved in &self.filters {
            let root = FilterParser::new(fields)
                .with_registry(&library)
                .with_max_depth(self.evaluation.max_depth)
                .parse(&saved.filter)
                .map_err(|source| ConfigError::InvalidFilter {
                    name: saved.name.clone(),
                    source,
                })?;
            library.add(FilterRule::new(&saved.name, root))?;
        }
        debug!(profile = %self.profile_name, filters = library.len(), "loaded filter library");
        Ok(library)
    }

    /// Parse every color rule; filters may reference any saved filter
    pub fn build_color_rules(
        &self,
        fields: &LogFields,
        library: &FilterLibrary,
    ) -> Result<ColorRules, ConfigError> {
        let mut rules = Vec::with_capacity(self.color_rules.len());
        for saved in &self.color_rules {
            let root = FilterParser::new(fields)
                .with_registry(library)
                .with_max_depth(self.evaluation.max_depth)
                .parse(&saved.filter)
                .map_err(|source| ConfigError::InvalidColorRule {
                    name: saved.name.clone(),
                    source,
                })?;
            let color = |value: &Option<String>| match value {
                Some(value) => parse_color(value).map(Some).ok_or_else(|| ConfigError::UnknownColor {
                    name: saved.name.clone(),
                    color: value.clone(),
                }),
                None => Ok(None),
            };

            let mut rule = ColorizingRule::new(FilterRule::new(&saved.name, root))
                .with_colors(color(&saved.foreground)?, color(&saved.background)?)
                .with_priority(saved.priority);
            rule.enabled = saved.enabled;
            rules.push(rule);
        }
        debug!(color_rules = rules.len(), "loaded color rules");
        Ok(ColorRules::new(rules))
    }
}

pub fn load_config(path: Option<&Path>) -> Result<FilterConfig, ConfigError> {
    if let Some(path) = path {
        load_config_from_path(path)
    } else {
        Ok(default_config().clone())
    }
}

pub fn load_config_from_path(path: &Path) -> Result<FilterConfig, ConfigError> {
    let path_display = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path_display.clone(),
        source,
    })?;

    toml::from_str::<FilterConfig>(&raw).map_err(|source| ConfigError::Parse {
        path: path_display,
        source,
    })
}

pub fn default_config() -> &'static FilterConfig {
    static DEFAULT_CONFIG: LazyLock<FilterConfig> = LazyLock::new(FilterConfig::default);
    &DEFAULT_CONFIG
}
