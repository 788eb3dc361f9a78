//! Deployment configuration
//!
//! Relying-party identity, ceremony timeouts and challenge TTLs are
//! deployment configuration. They are loaded once and injected into the
//! ceremony engine at construction; nothing in the crate reads process-wide
//! state after startup.

use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VaultkeySettings {
    pub relying_party: RelyingPartySettings,
    pub challenge: ChallengeSettings,
    pub logging: LoggingSettings,
}

/// WebAuthn relying-party identity and ceremony policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelyingPartySettings {
    /// Relying party id, the effective domain credentials bind to
    pub id: String,
    /// Display name shown by authenticator UIs
    pub name: String,
    /// Expected web origin of ceremony responses
    pub origin: String,
    /// Ceremony timeout advertised to clients, in seconds
    pub timeout_seconds: u64,
    /// "none", "indirect", "direct"
    pub attestation: String,
    /// "required", "preferred", "discouraged"
    pub user_verification: String,
    /// "platform", "cross-platform"
    pub authenticator_attachment: Option<String>,
}

impl Default for RelyingPartySettings {
    fn default() -> Self {
        Self {
            id: "localhost".to_string(),
            name: "Vaultkey".to_string(),
            origin: "http://localhost:8080".to_string(),
            timeout_seconds: 60,
            attestation: "direct".to_string(),
            user_verification: "preferred".to_string(),
            authenticator_attachment: None,
        }
    }
}

/// Challenge store policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeSettings {
    /// Hard TTL for live challenges, in seconds
    pub ttl_seconds: u64,
    /// Interval between expiry sweeps, in seconds
    pub sweep_interval_seconds: u64,
}

impl Default for ChallengeSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            sweep_interval_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl VaultkeySettings {
    /// Load settings from configuration files and environment variables
    ///
    /// Priority (highest to lowest): `VAULTKEY_*` environment variables,
    /// `Settings.toml` in `VAULTKEY_SECRETS_DIR`, `Settings.toml` in the
    /// current directory, built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file exists but cannot be read or
    /// parsed as TOML.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);
        Ok(settings)
    }

    /// Load base settings from TOML file(s) or use defaults
    fn load_base_settings() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::default();

        let default_config_path = std::path::PathBuf::from("Settings.toml");
        if default_config_path.exists() {
            let toml_content = fs::read_to_string(&default_config_path)?;
            settings = basic_toml::from_str(&toml_content)?;
            log::info!("loaded base settings from {}", default_config_path.display());
        }

        if let Ok(secrets_dir) = std::env::var("VAULTKEY_SECRETS_DIR") {
            let secrets_path = std::path::Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                let secrets_toml_content = fs::read_to_string(&secrets_path)?;
                settings = basic_toml::from_str(&secrets_toml_content)?;
                log::info!("overriding settings from {}", secrets_path.display());
            }
        }

        Ok(settings)
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        if let Ok(rp_id) = std::env::var("VAULTKEY_RP_ID") {
            settings.relying_party.id = rp_id;
        }
        if let Ok(rp_name) = std::env::var("VAULTKEY_RP_NAME") {
            settings.relying_party.name = rp_name;
        }
        if let Ok(origin) = std::env::var("VAULTKEY_RP_ORIGIN") {
            settings.relying_party.origin = origin;
        }
        Self::apply_numeric_env_override(
            "VAULTKEY_CEREMONY_TIMEOUT_SECONDS",
            &mut settings.relying_party.timeout_seconds,
        );
        Self::apply_numeric_env_override(
            "VAULTKEY_CHALLENGE_TTL_SECONDS",
            &mut settings.challenge.ttl_seconds,
        );
        if let Ok(level) = std::env::var("VAULTKEY_LOG_LEVEL") {
            settings.logging.level = level;
        }
    }

    fn apply_numeric_env_override(env_var: &str, target: &mut u64) {
        if let Ok(value_str) = std::env::var(env_var) {
            if let Ok(value) = value_str.parse::<u64>() {
                *target = value;
            } else {
                log::warn!("ignoring non-numeric value in {env_var}");
            }
        }
    }
}

/// Initialize the process logger from the configured level.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging(settings: &LoggingSettings) {
    let mut builder = env_logger::Builder::from_default_env();
    if let Ok(level) = settings.level.parse::<log::LevelFilter>() {
        builder.filter_level(level);
    }
    let _ = builder.try_init();
}
