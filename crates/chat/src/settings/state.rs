use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use medchat_llm::{DEFAULT_GEMINI_MODEL, DEFAULT_TEMPERATURE, GenerationSettings, ProviderConfig};
use serde::{Deserialize, Serialize};
use snafu::{Snafu, ensure};

pub const SETTINGS_DIRECTORY_NAME: &str = "medchat";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "MEDCHAT_";
/// Conventional variable name for the Gemini credential.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

const MAX_TEMPERATURE: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub max_tokens: Option<u64>,
    /// Overrides the provider base URL; empty means the provider default.
    #[serde(default)]
    pub endpoint: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            endpoint: String::new(),
        }
    }
}

impl AppSettings {
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn to_provider_config(&self) -> ProviderConfig {
        ProviderConfig::new(&self.api_key, &self.endpoint)
    }

    pub fn generation_settings(&self) -> GenerationSettings {
        let settings = GenerationSettings::default()
            .with_model(self.model.as_str())
            .with_temperature(self.temperature);

        match self.max_tokens {
            Some(max_tokens) => settings.with_max_tokens(max_tokens),
            None => settings,
        }
    }

    pub fn normalized(mut self) -> Self {
        self.api_key = self.api_key.trim().to_string();
        self.model = if self.model.trim().is_empty() {
            default_model()
        } else {
            self.model.trim().to_string()
        };
        self.endpoint = self.endpoint.trim().to_string();
        self
    }

    fn validate(self) -> Result<Self, SettingsError> {
        ensure!(
            (0.0..=MAX_TEMPERATURE).contains(&self.temperature),
            InvalidTemperatureSnafu {
                stage: "validate-settings",
                value: self.temperature,
            }
        );
        Ok(self)
    }
}

/// Layers defaults, the JSON settings file, and the environment.
///
/// Later layers win: defaults, then the file, then `GEMINI_API_KEY`, then `MEDCHAT_*`.
pub struct SettingsLoader {
    config_path: PathBuf,
    required: bool,
}

impl SettingsLoader {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".medchat"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    /// An explicit path must exist; the default path is optional.
    pub fn new(config_path: Option<PathBuf>) -> Self {
        match config_path {
            Some(config_path) => Self {
                config_path,
                required: true,
            },
            None => Self {
                config_path: Self::default_config_path(),
                required: false,
            },
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn figment(&self) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(AppSettings::default()));

        if self.config_path.exists() {
            figment = figment.merge(Json::file(&self.config_path));
        } else {
            tracing::info!("settings file not found at {:?}, using defaults", self.config_path);
        }

        Self::merge_env(figment)
    }

    fn merge_env(figment: Figment) -> Figment {
        figment
            .merge(Env::raw().only(&[API_KEY_ENV]).map(|_| "api_key".into()))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn try_load(&self) -> Result<AppSettings, SettingsError> {
        ensure!(
            !self.required || self.config_path.exists(),
            MissingConfigFileSnafu {
                stage: "load-settings",
                path: self.config_path.clone(),
            }
        );

        let settings = self
            .figment()
            .extract::<AppSettings>()
            .map_err(|source| SettingsError::Extract {
                stage: "extract-settings",
                source: Box::new(source),
            })?;

        settings.normalized().validate()
    }

    /// Like [`Self::try_load`], but falls back to defaults. The credential survives the
    /// fallback whenever some layer still provides one.
    pub fn load(&self) -> AppSettings {
        match self.try_load() {
            Ok(settings) => settings,
            Err(error) => {
                tracing::warn!(
                    "failed to load settings from {:?}: {}. using defaults",
                    self.config_path,
                    error
                );
                AppSettings {
                    api_key: self.recover_api_key(),
                    ..AppSettings::default()
                }
            }
        }
    }

    /// Reads only `api_key`, first from every layer, then from the environment alone
    /// in case the file itself is unreadable.
    fn recover_api_key(&self) -> String {
        let api_key = self
            .figment()
            .extract_inner::<String>("api_key")
            .or_else(|_| Self::merge_env(Figment::new()).extract_inner::<String>("api_key"))
            .unwrap_or_default();

        api_key.trim().to_string()
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("settings file {path:?} does not exist"))]
    MissingConfigFile { stage: &'static str, path: PathBuf },
    #[snafu(display("failed to extract settings on `{stage}`: {source}"))]
    Extract {
        stage: &'static str,
        source: Box<figment::Error>,
    },
    #[snafu(display("temperature {value} is outside 0.0..=2.0"))]
    InvalidTemperature { stage: &'static str, value: f64 },
}

fn default_model() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}
