//! Configuration loading.
//!
//! Precedence for pipeline settings: defaults < `subscout.json` < `SUBSCOUT_*`
//! environment < CLI flags (applied by the binary).
//!
//! Precedence for credentials, merged by secret: config object < keys file <
//! `SUBSCOUT_SEARCH_KEYS`. A later source overrides quota and reset fields of
//! the same secret; secrets are never duplicated.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use subscout_types::{ConfigError, CredentialSpec, PipelineConfig};
use validator::{Validate, ValidationErrors};

use crate::error::{AppError, AppResult};

pub const CONFIG_FILE: &str = "subscout.json";
pub const KEYS_FILE: &str = "keys";
pub const REGISTRATION_DATES_FILE: &str = "api_key_registration_dates.json";
pub const KEYS_ENV: &str = "SUBSCOUT_SEARCH_KEYS";

/// Default data directory: `<platform data dir>/subscout`, or `./data`.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir().map_or_else(|| PathBuf::from("data"), |d| d.join("subscout"))
}

/// Load the config file (explicit path or `<data_dir>/subscout.json`) and
/// apply environment overrides. Not validated yet; CLI flags come next.
pub fn load_config(explicit: Option<&Path>, data_dir: &Path) -> AppResult<PipelineConfig> {
    let path = match explicit {
        Some(p) if !p.exists() => {
            return Err(ConfigError::NotFound { path: p.display().to_string() }.into());
        }
        Some(p) => Some(p.to_path_buf()),
        None => Some(data_dir.join(CONFIG_FILE)).filter(|p| p.exists()),
    };

    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)?;
            let config: PipelineConfig = serde_json::from_str(&content)
                .map_err(|e| AppError::Config(ConfigError::from_json_error(&e)))?;
            tracing::debug!("Loaded configuration from {}", path.display());
            config
        }
        None => PipelineConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(key, format!("cannot parse '{}'", value)))
}

/// Apply `SUBSCOUT_*` overrides through `lookup` (injectable for tests).
pub fn apply_env_overrides<F>(config: &mut PipelineConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("SUBSCOUT_SIGNATURE") {
        config.signature = v;
    }
    if let Some(v) = lookup("SUBSCOUT_WORKERS") {
        config.worker_pool_size = parse_env("SUBSCOUT_WORKERS", &v)?;
    }
    if let Some(v) = lookup("SUBSCOUT_PROBE_TIMEOUT") {
        config.probe_timeout_secs = parse_env("SUBSCOUT_PROBE_TIMEOUT", &v)?;
    }
    if let Some(v) = lookup("SUBSCOUT_RUN_DEADLINE") {
        config.run_deadline_secs = parse_env("SUBSCOUT_RUN_DEADLINE", &v)?;
    }
    if let Some(v) = lookup("SUBSCOUT_MAX_NODES") {
        config.max_nodes = Some(parse_env("SUBSCOUT_MAX_NODES", &v)?);
    }
    if let Some(v) = lookup("SUBSCOUT_SEARCH_BASE_URL") {
        config.discovery.search_base_url = v;
    }
    if let Some(v) = lookup("SUBSCOUT_MIN_SEARCHES_LEFT") {
        config.discovery.min_searches_left = parse_env("SUBSCOUT_MIN_SEARCHES_LEFT", &v)?;
    }
    if let Some(v) = lookup("SUBSCOUT_SEED_URLS") {
        config.seed_urls.extend(
            v.split([',', '\n', ' ']).map(str::trim).filter(|s| !s.is_empty()).map(String::from),
        );
    }
    Ok(())
}

/// Run derive-based validation plus cross-field checks.
pub fn validate_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    config.validate().map_err(|e| first_validation_error(&e))?;
    config.check_bounds()
}

fn first_validation_error(errors: &ValidationErrors) -> ConfigError {
    for (field, kind) in errors.errors() {
        match kind {
            validator::ValidationErrorsKind::Field(list) => {
                let message = list
                    .first()
                    .map(|e| {
                        e.message.as_ref().map_or_else(|| e.code.to_string(), |m| m.to_string())
                    })
                    .unwrap_or_else(|| "invalid value".to_string());
                return ConfigError::invalid(field.to_string(), message);
            }
            validator::ValidationErrorsKind::Struct(inner) => {
                if let ConfigError::ValidationError { field: sub, message } =
                    first_validation_error(inner)
                {
                    return ConfigError::invalid(format!("{}.{}", field, sub), message);
                }
            }
            validator::ValidationErrorsKind::List(_) => {
                return ConfigError::invalid(field.to_string(), "invalid list entry");
            }
        }
    }
    ConfigError::invalid("config", errors.to_string())
}

/// Parse a keys file: one `secret[,quota[,YYYY-MM-DD]]` per line, `#` comments.
pub fn parse_keys_file(text: &str) -> Result<Vec<CredentialSpec>, ConfigError> {
    let mut specs = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let location = format!("{}:{}", KEYS_FILE, idx + 1);
        let mut cols = line.split(',').map(str::trim);
        let value = cols.next().unwrap_or_default();
        if value.is_empty() {
            return Err(ConfigError::CredentialRecord { location, message: "empty secret".into() });
        }
        let mut spec = CredentialSpec::new(value);
        if let Some(q) = cols.next().filter(|s| !s.is_empty()) {
            spec.quota = Some(q.parse().map_err(|_| ConfigError::CredentialRecord {
                location: location.clone(),
                message: format!("quota '{}' is not a number", q),
            })?);
        }
        if let Some(d) = cols.next().filter(|s| !s.is_empty()) {
            spec.registered_on = Some(NaiveDate::parse_from_str(d, "%Y-%m-%d").map_err(|_| {
                ConfigError::CredentialRecord {
                    location: location.clone(),
                    message: format!("date '{}' is not YYYY-MM-DD", d),
                }
            })?);
        }
        specs.push(spec);
    }
    Ok(specs)
}

/// Parse `SUBSCOUT_SEARCH_KEYS`: secrets separated by commas or whitespace.
pub fn parse_env_keys(value: &str) -> Vec<CredentialSpec> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(CredentialSpec::new)
        .collect()
}

/// Merge credential sources in increasing precedence.
pub fn merge_credentials(sources: &[Vec<CredentialSpec>]) -> Vec<CredentialSpec> {
    let mut merged: Vec<CredentialSpec> = Vec::new();
    for source in sources {
        for spec in source {
            match merged.iter_mut().find(|m| m.value == spec.value) {
                Some(existing) => {
                    if spec.quota.is_some() {
                        existing.quota = spec.quota;
                    }
                    if spec.reset_date.is_some() {
                        existing.reset_date = spec.reset_date;
                    }
                    if spec.registered_on.is_some() {
                        existing.registered_on = spec.registered_on;
                    }
                }
                None => merged.push(spec.clone()),
            }
        }
    }
    merged
}

/// Full SHA-256 hex of a secret, the key used in the registration-dates file.
pub fn secret_hash(secret: &str) -> String {
    format!("{:x}", Sha256::digest(secret.trim().as_bytes()))
}

/// Fill missing registration dates from `{"key_registration_dates": {hash: date}}`.
pub fn apply_registration_dates(specs: &mut [CredentialSpec], text: &str) -> Result<(), ConfigError> {
    #[derive(serde::Deserialize)]
    struct RegistrationFile {
        #[serde(default)]
        key_registration_dates: HashMap<String, String>,
    }

    let file: RegistrationFile =
        serde_json::from_str(text).map_err(|e| ConfigError::from_json_error(&e))?;
    for spec in specs.iter_mut().filter(|s| s.registered_on.is_none()) {
        let hash = secret_hash(&spec.value);
        if let Some(date) = file.key_registration_dates.get(&hash) {
            spec.registered_on = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok();
        }
    }
    Ok(())
}

/// Resolve credentials from every source under `data_dir`.
pub fn load_credential_specs(config: &PipelineConfig, data_dir: &Path) -> AppResult<Vec<CredentialSpec>> {
    let keys_path = data_dir.join(KEYS_FILE);
    let from_file = match std::fs::read_to_string(&keys_path) {
        Ok(text) => parse_keys_file(&text)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    let from_env = std::env::var(KEYS_ENV).map(|v| parse_env_keys(&v)).unwrap_or_default();

    let mut specs = merge_credentials(&[config.credentials.clone(), from_file, from_env]);

    let dates_path = data_dir.join(REGISTRATION_DATES_FILE);
    if let Ok(text) = std::fs::read_to_string(&dates_path) {
        if let Err(e) = apply_registration_dates(&mut specs, &text) {
            tracing::warn!("Ignoring {}: {}", dates_path.display(), e);
        }
    }

    tracing::debug!("Resolved {} search credential(s)", specs.len());
    Ok(specs)
}
