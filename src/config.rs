use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::warn;

pub const DEFAULT_ENDPOINT_URL: &str = "http://localhost:11434/api/chat";
pub const DEFAULT_MODEL: &str = "llama3";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

fn default_endpoint_url() -> String {
    DEFAULT_ENDPOINT_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

/// Fallbacks used until the user fills in the setup fields.
#[derive(Debug, Deserialize, Serialize)]
pub struct OllamaConfig {
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        OllamaConfig {
            endpoint_url: default_endpoint_url(),
            model: default_model(),
            timeout_secs: None,
        }
    }
}

fn default_build_command() -> String {
    "npm run build:tailwind".to_string()
}

fn default_output_html() -> PathBuf {
    PathBuf::from("src/html/output.html")
}

fn default_stylesheet() -> PathBuf {
    PathBuf::from("src/css/output.css")
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BuildConfig {
    #[serde(default = "default_build_command")]
    pub command: String,
    /// Directory holding the Tailwind project (`package.json`). Defaults to
    /// the directory valrender was launched from.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Content file scanned by the CSS build, relative to `working_dir`.
    #[serde(default = "default_output_html")]
    pub output_html: PathBuf,
    #[serde(default = "default_stylesheet")]
    pub stylesheet: PathBuf,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            command: default_build_command(),
            working_dir: None,
            output_html: default_output_html(),
            stylesheet: default_stylesheet(),
        }
    }
}

impl BuildConfig {
    pub fn working_dir(&self) -> PathBuf {
        self.working_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn output_html_path(&self) -> PathBuf {
        self.working_dir().join(&self.output_html)
    }

    pub fn stylesheet_path(&self) -> PathBuf {
        self.working_dir().join(&self.stylesheet)
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub min_width: u32,
    pub min_height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            width: 960,
            height: 720,
            min_width: 480,
            min_height: 360,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub desktop: bool,
}

impl Config {
    pub fn load() -> Self {
        let config_path = Self::get_config_path();

        if config_path.exists() {
            match fs::read_to_string(&config_path) {
                Ok(contents) => match Self::parse(&contents) {
                    Ok(config) => return config,
                    Err(e) => warn!("Error parsing config.toml: {}. Using defaults.", e),
                },
                Err(e) => warn!("Error reading config.toml: {}. Using defaults.", e),
            }
        } else if let Some(parent) = config_path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        Config::default()
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn get_config_path() -> PathBuf {
        Self::get_config_dir().join("config.toml")
    }

    pub fn get_config_dir() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/valrender")
        } else {
            PathBuf::from(".")
        }
    }
}
