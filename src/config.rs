//! Process configuration, read once from the environment

use crate::history::CorruptHistoryPolicy;
use crate::llm::DEFAULT_BASE_URL;
use crate::session::SessionSettings;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const API_KEY_VAR: &str = "GEMINI_API_KEY";

const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_HISTORY_PATH: &str = "chat_history.json";
const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a helpful AI assistant. You can see images.";
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(120);
/// A 20 MB image is about 27 MB once base64-encoded
const DEFAULT_MAX_BODY_BYTES: usize = 30 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} is not set; refusing to start without a provider credential")]
    MissingCredential(&'static str),
    #[error("invalid {var}={value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone)]
pub struct Config {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub history_path: PathBuf,
    pub history_policy: CorruptHistoryPolicy,
    pub system_instruction: String,
    pub temperature: f32,
    pub provider_timeout: Duration,
    pub context_turns: Option<usize>,
    pub max_body_bytes: usize,
    pub bind: SocketAddr,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("history_path", &self.history_path)
            .field("history_policy", &self.history_policy)
            .field("temperature", &self.temperature)
            .field("provider_timeout", &self.provider_timeout)
            .field("context_turns", &self.context_turns)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("bind", &self.bind)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let api_key = get(API_KEY_VAR).ok_or(ConfigError::MissingCredential(API_KEY_VAR))?;

        let temperature: f32 = parse_or(&get, "CHAT_TEMPERATURE", DEFAULT_TEMPERATURE)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(invalid(
                "CHAT_TEMPERATURE",
                temperature.to_string(),
                "must be between 0 and 2",
            ));
        }

        let timeout_secs: u64 = parse_or(
            &get,
            "CHAT_PROVIDER_TIMEOUT_SECS",
            DEFAULT_PROVIDER_TIMEOUT.as_secs(),
        )?;
        if timeout_secs == 0 {
            return Err(invalid("CHAT_PROVIDER_TIMEOUT_SECS", "0", "must be positive"));
        }

        let context_turns = match get("CHAT_CONTEXT_TURNS") {
            Some(raw) => Some(parse_var::<usize>("CHAT_CONTEXT_TURNS", &raw)?),
            None => None,
        };

        let history_policy = match get("CHAT_HISTORY_POLICY") {
            Some(raw) => raw
                .parse::<CorruptHistoryPolicy>()
                .map_err(|reason| invalid("CHAT_HISTORY_POLICY", raw.clone(), reason))?,
            None => CorruptHistoryPolicy::default(),
        };

        let max_body_bytes: usize =
            parse_or(&get, "CHAT_MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES)?;
        if max_body_bytes == 0 {
            return Err(invalid("CHAT_MAX_BODY_BYTES", "0", "must be positive"));
        }

        let ip: IpAddr = parse_or(&get, "CHAT_BIND", IpAddr::V4(Ipv4Addr::UNSPECIFIED))?;
        let port: u16 = parse_or(&get, "CHAT_PORT", DEFAULT_PORT)?;

        Ok(Self {
            api_key,
            model: get("CHAT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: get("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            history_path: get("CHAT_HISTORY_PATH")
                .map_or_else(|| PathBuf::from(DEFAULT_HISTORY_PATH), PathBuf::from),
            history_policy,
            system_instruction: get("CHAT_SYSTEM_INSTRUCTION")
                .unwrap_or_else(|| DEFAULT_SYSTEM_INSTRUCTION.to_string()),
            temperature,
            provider_timeout: Duration::from_secs(timeout_secs),
            context_turns,
            max_body_bytes,
            bind: SocketAddr::new(ip, port),
        })
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            model: self.model.clone(),
            system_instruction: self.system_instruction.clone(),
            temperature: self.temperature,
            provider_timeout: self.provider_timeout,
            context_turns: self.context_turns,
        }
    }
}

fn invalid(var: &'static str, value: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.into(),
        reason: reason.into(),
    }
}

fn parse_var<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| invalid(var, raw, e.to_string()))
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        Some(raw) => parse_var(var, &raw),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_missing_credential_is_fatal() {
        assert!(matches!(
            config(&[]),
            Err(ConfigError::MissingCredential(API_KEY_VAR))
        ));
        assert!(matches!(
            config(&[(API_KEY_VAR, "   ")]),
            Err(ConfigError::MissingCredential(_))
        ));
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[(API_KEY_VAR, "secret")]).unwrap();

        assert_eq!(cfg.api_key, "secret");
        assert_eq!(cfg.model, "gemini-2.0-flash");
        assert_eq!(cfg.history_path, PathBuf::from("chat_history.json"));
        assert_eq!(cfg.history_policy, CorruptHistoryPolicy::FailOpen);
        assert!((cfg.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(cfg.provider_timeout, Duration::from_secs(120));
        assert_eq!(cfg.context_turns, None);
        assert_eq!(cfg.max_body_bytes, 30 * 1024 * 1024);
        assert_eq!(cfg.bind.port(), 8000);
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            (API_KEY_VAR, "secret"),
            ("CHAT_MODEL", "gemini-2.5-pro"),
            ("CHAT_HISTORY_PATH", "/var/lib/chat/history.json"),
            ("CHAT_HISTORY_POLICY", "fail-closed"),
            ("CHAT_TEMPERATURE", "1.5"),
            ("CHAT_PROVIDER_TIMEOUT_SECS", "30"),
            ("CHAT_CONTEXT_TURNS", "40"),
            ("CHAT_MAX_BODY_BYTES", "52428800"),
            ("CHAT_BIND", "127.0.0.1"),
            ("CHAT_PORT", "9090"),
        ])
        .unwrap();

        assert_eq!(cfg.model, "gemini-2.5-pro");
        assert_eq!(cfg.history_policy, CorruptHistoryPolicy::FailClosed);
        assert_eq!(cfg.provider_timeout, Duration::from_secs(30));
        assert_eq!(cfg.context_turns, Some(40));
        assert_eq!(cfg.max_body_bytes, 50 * 1024 * 1024);
        assert_eq!(cfg.bind, "127.0.0.1:9090".parse().unwrap());

        let settings = cfg.session_settings();
        assert_eq!(settings.model, "gemini-2.5-pro");
        assert_eq!(settings.context_turns, Some(40));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for (var, value) in [
            ("CHAT_TEMPERATURE", "hot"),
            ("CHAT_TEMPERATURE", "3.5"),
            ("CHAT_PORT", "70000"),
            ("CHAT_PROVIDER_TIMEOUT_SECS", "0"),
            ("CHAT_CONTEXT_TURNS", "-1"),
            ("CHAT_MAX_BODY_BYTES", "0"),
            ("CHAT_MAX_BODY_BYTES", "20MB"),
            ("CHAT_HISTORY_POLICY", "maybe"),
            ("CHAT_BIND", "localhost:80"),
        ] {
            let err = config(&[(API_KEY_VAR, "secret"), (var, value)]).unwrap_err();
            assert!(
                matches!(&err, ConfigError::Invalid { var: v, .. } if *v == var),
                "{var}={value} gave {err}"
            );
        }
    }

    #[test]
    fn test_debug_redacts_credential() {
        let cfg = config(&[(API_KEY_VAR, "super-secret-key")]).unwrap();
        assert!(!format!("{cfg:?}").contains("super-secret-key"));
    }
}
