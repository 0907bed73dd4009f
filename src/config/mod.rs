//! Dashboard configuration for Informer
//!
//! The YAML file declares pages made of columns of widgets, plus a few
//! global settings. The file is re-read on each page request so edits show
//! up without a restart.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "informer.yml";

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8080;

/// Parsed dashboard configuration
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub pages: Vec<PageConfig>,
    pub settings: Settings,
}

/// Global settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Hide widget errors on the dashboard instead of showing them
    #[serde(default)]
    pub hide_errors: bool,

    /// Cache root override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hide_errors: false,
            cache_dir: None,
            host: default_host(),
            port: default_port(),
        }
    }
}

/// One dashboard page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,

    #[serde(default, skip_serializing)]
    pub hide: bool,

    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
}

impl PageConfig {
    /// The slug, derived from the name when not configured
    pub fn slug(&self) -> String {
        self.slug.clone().unwrap_or_else(|| page_slug(&self.name))
    }

    /// Whether `page` names this page by slug or by name
    pub fn matches(&self, page: &str) -> bool {
        self.slug() == page || self.name == page
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    #[serde(default)]
    pub widgets: Vec<WidgetConfig>,
}

/// A widget entry: its type plus free-form parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetConfig {
    /// Position of the widget in the file, starting at 1
    #[serde(default, skip_deserializing)]
    pub id: usize,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl WidgetConfig {
    pub fn params_value(&self) -> Value {
        Value::Object(self.params.clone())
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    pages: Vec<PageConfig>,

    /// Either a mapping or a list of single-entry mappings
    #[serde(default)]
    settings: Option<serde_yaml::Value>,
}

/// Normalise a page name into a URL slug
pub fn page_slug(name: &str) -> String {
    name.replace([' ', '-', '.'], "_").to_lowercase()
}

fn parse_settings(raw: Option<serde_yaml::Value>) -> std::result::Result<Settings, ConfigError> {
    let merged = match raw {
        None | Some(serde_yaml::Value::Null) => return Ok(Settings::default()),
        Some(serde_yaml::Value::Sequence(items)) => {
            let mut merged = serde_yaml::Mapping::new();
            for item in items {
                if let serde_yaml::Value::Mapping(entry) = item {
                    merged.extend(entry);
                }
            }
            serde_yaml::Value::Mapping(merged)
        }
        Some(mapping @ serde_yaml::Value::Mapping(_)) => mapping,
        Some(_) => {
            return Err(ConfigError::Invalid(
                "settings must be a mapping or a list of mappings".to_string(),
            ));
        }
    };
    Ok(serde_yaml::from_value(merged)?)
}

impl Config {
    /// Path of the configuration file in the working directory
    pub fn default_path() -> PathBuf {
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    /// Load and sanitise the configuration at `path`
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()).into());
        }

        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and sanitise configuration text
    pub fn parse(contents: &str) -> Result<Self> {
        let raw: RawConfig = serde_yaml::from_str(contents).map_err(ConfigError::from)?;
        let settings = parse_settings(raw.settings)?;

        let mut config = Config {
            pages: raw.pages,
            settings,
        };
        config.sanitize();
        Ok(config)
    }

    /// Drop hidden pages, fill in slugs and number the widgets.
    fn sanitize(&mut self) {
        self.pages.retain(|page| !page.hide);

        let mut next_id = 0;
        for page in &mut self.pages {
            if page.slug.as_deref().is_none_or(str::is_empty) {
                page.slug = Some(page_slug(&page.name));
            }
            for widget in page.columns.iter_mut().flat_map(|c| c.widgets.iter_mut()) {
                next_id += 1;
                widget.id = next_id;
            }
        }
    }

    pub fn find_page(&self, page: &str) -> Option<&PageConfig> {
        self.pages.iter().find(|p| p.matches(page))
    }

    /// Every widget on every visible page, in file order
    pub fn all_widgets(&self) -> impl Iterator<Item = &WidgetConfig> {
        self.pages
            .iter()
            .flat_map(|p| p.columns.iter())
            .flat_map(|c| c.widgets.iter())
    }
}
