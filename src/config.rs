// file: config.rs
// desc: provider selection, Firebase settings and feature limits

use std::str::FromStr;

use crate::error::ConfigError;
use crate::inference::ModelProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecognizerProvider {
    #[default]
    Ichisadashioko,
}

impl RecognizerProvider {
    pub fn profile(self) -> ModelProfile {
        match self {
            RecognizerProvider::Ichisadashioko => ModelProfile::ICHISADASHIOKO,
        }
    }
}

impl FromStr for RecognizerProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ichisadashioko" => Ok(RecognizerProvider::Ichisadashioko),
            "dakanji" => Err(ConfigError::Unsupported(s.to_string())),
            _ => Err(ConfigError::Unknown(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageProvider {
    #[default]
    Local,
    Firebase,
}

impl FromStr for StorageProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(StorageProvider::Local),
            "firebase" => Ok(StorageProvider::Firebase),
            "supabase" => Err(ConfigError::Unsupported(s.to_string())),
            _ => Err(ConfigError::Unknown(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthProvider {
    #[default]
    Local,
    Firebase,
}

impl FromStr for AuthProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(AuthProvider::Local),
            "firebase" => Ok(AuthProvider::Firebase),
            "supabase" => Err(ConfigError::Unsupported(s.to_string())),
            _ => Err(ConfigError::Unknown(s.to_string())),
        }
    }
}

/// Firebase web app settings (Project Settings > General > Your apps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FirebaseConfig {
    pub api_key: &'static str,
    pub auth_domain: &'static str,
    pub project_id: &'static str,
    pub storage_bucket: &'static str,
    pub messaging_sender_id: &'static str,
    pub app_id: &'static str,
}

impl FirebaseConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: option_env!("KANJI_FIREBASE_API_KEY").unwrap_or(""),
            auth_domain: option_env!("KANJI_FIREBASE_AUTH_DOMAIN").unwrap_or(""),
            project_id: option_env!("KANJI_FIREBASE_PROJECT_ID").unwrap_or(""),
            storage_bucket: option_env!("KANJI_FIREBASE_STORAGE_BUCKET").unwrap_or(""),
            messaging_sender_id: option_env!("KANJI_FIREBASE_MESSAGING_SENDER_ID").unwrap_or(""),
            app_id: option_env!("KANJI_FIREBASE_APP_ID").unwrap_or(""),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && !self.project_id.is_empty()
    }
}

/// Maximum stored history per kind of user; `None` is unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLimits {
    pub anonymous: Option<usize>,
    pub authenticated: Option<usize>,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            anonymous: Some(100),
            authenticated: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppConfig {
    pub recognizer: RecognizerProvider,
    pub storage: StorageProvider,
    pub auth: AuthProvider,
    pub firebase: FirebaseConfig,
    pub history_limits: HistoryLimits,
    pub top_k: usize,
    pub canvas_size: f64,
    pub stroke_width: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            recognizer: RecognizerProvider::default(),
            storage: StorageProvider::default(),
            auth: AuthProvider::default(),
            firebase: FirebaseConfig::default(),
            history_limits: HistoryLimits::default(),
            top_k: crate::rank::DEFAULT_TOP_K,
            canvas_size: 300.0,
            stroke_width: 12.0,
        }
    }
}

impl AppConfig {
    /// Read provider names and Firebase settings captured at compile time.
    /// Unset names keep their defaults; unknown or unbuilt providers fail.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_parts(
            option_env!("KANJI_RECOGNIZER_PROVIDER"),
            option_env!("KANJI_STORAGE_PROVIDER"),
            option_env!("KANJI_AUTH_PROVIDER"),
            FirebaseConfig::from_env(),
        )
    }

    pub fn from_parts(
        recognizer: Option<&str>,
        storage: Option<&str>,
        auth: Option<&str>,
        firebase: FirebaseConfig,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            recognizer: recognizer.map_or(Ok(defaults.recognizer), str::parse)?,
            storage: storage.map_or(Ok(defaults.storage), str::parse)?,
            auth: auth.map_or(Ok(defaults.auth), str::parse)?,
            firebase,
            ..defaults
        })
    }
}
