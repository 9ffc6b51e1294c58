//! Connector capabilities and loading.
//!
//! Capabilities are loaded from a JSON file (e.g. `~/.livechat/caps.json`) whose keys are the
//! `SPRINKL_*` capability names. Each key can be overridden by an environment variable of the
//! same name.

use crate::error::ValidationError;
use crate::identity::ChatUser;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const ENVIRONMENT: &str = "SPRINKL_ENVIRONMENT";
pub const APP_ID: &str = "SPRINKL_APP_ID";
pub const LANDING_PAGE_URL: &str = "SPRINKL_LANDING_PAGE_URL";
pub const TIMEZONE: &str = "SPRINKL_TIMEZONE";
pub const RESPONSE_POLL_INTERVAL: &str = "SPRINKL_RESPONSE_POLL_INTERVAL";
pub const USER_AGENT: &str = "SPRINKL_USER_AGENT";
pub const FALLBACK_LOCALES: &str = "SPRINKL_FALLBACK_LOCALES";
pub const API_KEY: &str = "SPRINKL_API_KEY";
pub const CHAT_USER: &str = "SPRINKL_CHAT_USER";
pub const CUSTOM_CONTEXT: &str = "SPRINKL_CUSTOM_CONTEXT";
pub const STARTED_BY_CONTEXT: &str = "SPRINKL_STARTED_BY_CONTEXT";
pub const API_BASE_URL: &str = "SPRINKL_API_BASE_URL";

const DEFAULT_TIMEZONE: &str = "America/New_York";
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.36";

/// Vendor deployment the connector talks to. Selects the API host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    App,
    Prod,
    Prod0,
    Prod1,
    Prod2,
    Prod3,
    Prod4,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::App => "app",
            Environment::Prod => "prod",
            Environment::Prod0 => "prod0",
            Environment::Prod1 => "prod1",
            Environment::Prod2 => "prod2",
            Environment::Prod3 => "prod3",
            Environment::Prod4 => "prod4",
        }
    }

    /// Default API root for this environment.
    pub fn api_base_url(&self) -> String {
        format!(
            "https://{}-live-chat.sprinklr.com/api/livechat/v1",
            self.as_str()
        )
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "app" => Ok(Environment::App),
            "prod" => Ok(Environment::Prod),
            "prod0" => Ok(Environment::Prod0),
            "prod1" => Ok(Environment::Prod1),
            "prod2" => Ok(Environment::Prod2),
            "prod3" => Ok(Environment::Prod3),
            "prod4" => Ok(Environment::Prod4),
            other => Err(ValidationError::InvalidValue {
                key: ENVIRONMENT,
                value: other.to_string(),
            }),
        }
    }
}

/// Resolved capability map handed to the connector by the harness.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(rename = "SPRINKL_ENVIRONMENT", default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,

    #[serde(rename = "SPRINKL_APP_ID", default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,

    /// Page the chat widget pretends to run on. Also sent as the handshake `origin` header.
    #[serde(rename = "SPRINKL_LANDING_PAGE_URL", default, skip_serializing_if = "Option::is_none")]
    pub landing_page_url: Option<String>,

    /// IANA timezone (default "America/New_York").
    #[serde(rename = "SPRINKL_TIMEZONE", default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    /// Delay between poll cycles in milliseconds (default 100).
    #[serde(rename = "SPRINKL_RESPONSE_POLL_INTERVAL", default, skip_serializing_if = "Option::is_none")]
    pub response_poll_interval: Option<u64>,

    #[serde(rename = "SPRINKL_USER_AGENT", default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    #[serde(rename = "SPRINKL_FALLBACK_LOCALES", default, skip_serializing_if = "Option::is_none")]
    pub fallback_locales: Option<String>,

    /// Signing secret for the chat user. Required when `chat_user` is set.
    #[serde(rename = "SPRINKL_API_KEY", default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Chat user identity: JSON object or a string containing one.
    #[serde(rename = "SPRINKL_CHAT_USER", default, skip_serializing_if = "Option::is_none")]
    pub chat_user: Option<Value>,

    #[serde(rename = "SPRINKL_CUSTOM_CONTEXT", default, skip_serializing_if = "Option::is_none")]
    pub custom_context: Option<Value>,

    #[serde(rename = "SPRINKL_STARTED_BY_CONTEXT", default, skip_serializing_if = "Option::is_none")]
    pub started_by_context: Option<Value>,

    /// Overrides the environment-derived API root (e.g. a local stub server).
    #[serde(rename = "SPRINKL_API_BASE_URL", default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
}

impl Capabilities {
    /// Check required keys and the chat-user/api-key pairing. Performs no network I/O.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if non_empty(self.api_base_url.as_deref()).is_none() && self.environment.is_none() {
            return Err(ValidationError::Missing(ENVIRONMENT));
        }
        if non_empty(self.app_id.as_deref()).is_none() {
            return Err(ValidationError::Missing(APP_ID));
        }
        if non_empty(self.landing_page_url.as_deref()).is_none() {
            return Err(ValidationError::Missing(LANDING_PAGE_URL));
        }
        if self.chat_user()?.is_some() && self.api_key().is_none() {
            return Err(ValidationError::ChatUserWithoutApiKey);
        }
        self.custom_context()?;
        self.started_by_context()?;
        Ok(())
    }

    /// API root without trailing slash.
    pub fn base_url(&self) -> Result<String, ValidationError> {
        if let Some(url) = non_empty(self.api_base_url.as_deref()) {
            return Ok(url.trim_end_matches('/').to_string());
        }
        self.environment
            .map(|e| e.api_base_url())
            .ok_or(ValidationError::Missing(ENVIRONMENT))
    }

    pub fn app_id(&self) -> &str {
        non_empty(self.app_id.as_deref()).unwrap_or("")
    }

    pub fn landing_page_url(&self) -> &str {
        non_empty(self.landing_page_url.as_deref()).unwrap_or("")
    }

    pub fn timezone(&self) -> &str {
        non_empty(self.timezone.as_deref()).unwrap_or(DEFAULT_TIMEZONE)
    }

    pub fn user_agent(&self) -> &str {
        non_empty(self.user_agent.as_deref()).unwrap_or(DEFAULT_USER_AGENT)
    }

    pub fn fallback_locales(&self) -> Option<&str> {
        non_empty(self.fallback_locales.as_deref())
    }

    pub fn api_key(&self) -> Option<&str> {
        non_empty(self.api_key.as_deref())
    }

    /// Poll interval; zero is treated as unset.
    pub fn poll_interval(&self) -> Duration {
        let ms = self
            .response_poll_interval
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        Duration::from_millis(ms)
    }

    pub fn chat_user(&self) -> Result<Option<ChatUser>, ValidationError> {
        Ok(json_object(CHAT_USER, self.chat_user.as_ref())?.map(|v| ChatUser::from_value(&v)))
    }

    pub fn custom_context(&self) -> Result<Option<Value>, ValidationError> {
        json_object(CUSTOM_CONTEXT, self.custom_context.as_ref())
    }

    pub fn started_by_context(&self) -> Result<Option<Value>, ValidationError> {
        json_object(STARTED_BY_CONTEXT, self.started_by_context.as_ref())
    }

    /// Override capabilities from the process environment (`SPRINKL_*` variables).
    pub fn apply_env_overrides(&mut self) -> Result<(), ValidationError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Override capabilities from `lookup`; blank values are ignored.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ValidationError> {
        let get = |key: &str| {
            lookup(key).and_then(|s| {
                let t = s.trim();
                if t.is_empty() {
                    None
                } else {
                    Some(t.to_string())
                }
            })
        };
        if let Some(v) = get(ENVIRONMENT) {
            self.environment = Some(v.parse()?);
        }
        if let Some(v) = get(RESPONSE_POLL_INTERVAL) {
            let ms = v.parse::<u64>().map_err(|_| ValidationError::InvalidValue {
                key: RESPONSE_POLL_INTERVAL,
                value: v.clone(),
            })?;
            self.response_poll_interval = Some(ms);
        }
        for (key, slot) in [
            (APP_ID, &mut self.app_id),
            (LANDING_PAGE_URL, &mut self.landing_page_url),
            (TIMEZONE, &mut self.timezone),
            (USER_AGENT, &mut self.user_agent),
            (FALLBACK_LOCALES, &mut self.fallback_locales),
            (API_KEY, &mut self.api_key),
            (API_BASE_URL, &mut self.api_base_url),
        ] {
            if let Some(v) = get(key) {
                *slot = Some(v);
            }
        }
        for (key, slot) in [
            (CHAT_USER, &mut self.chat_user),
            (CUSTOM_CONTEXT, &mut self.custom_context),
            (STARTED_BY_CONTEXT, &mut self.started_by_context),
        ] {
            if let Some(v) = get(key) {
                *slot = Some(Value::String(v));
            }
        }
        Ok(())
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Accept either a JSON object or a string holding one. Null and blank strings mean unset.
fn json_object(key: &'static str, value: Option<&Value>) -> Result<Option<Value>, ValidationError> {
    let value = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => {
            serde_json::from_str::<Value>(s).map_err(|e| ValidationError::InvalidJson {
                key,
                reason: e.to_string(),
            })?
        }
        Some(v) => v.clone(),
    };
    if !value.is_object() {
        return Err(ValidationError::NotAnObject { key });
    }
    Ok(Some(value))
}

/// Resolve caps path from env or default.
pub fn default_caps_path() -> PathBuf {
    std::env::var("LIVECHAT_CAPS_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".livechat").join("caps.json"))
            .unwrap_or_else(|| PathBuf::from("caps.json"))
    })
}

/// Load capabilities from the given path (or the default) and apply environment overrides.
/// Missing file => default capabilities. Returns the capabilities and the path used.
pub fn load_capabilities(path: Option<PathBuf>) -> Result<(Capabilities, PathBuf)> {
    let path = path.unwrap_or_else(default_caps_path);
    let mut caps = if !path.exists() {
        log::debug!("caps file not found, using defaults: {}", path.display());
        Capabilities::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading capabilities from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing capabilities from {}", path.display()))?
    };
    caps.apply_env_overrides()
        .context("applying environment overrides")?;
    Ok((caps, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn minimal() -> Capabilities {
        Capabilities {
            environment: Some(Environment::Prod2),
            app_id: Some("app-1".to_string()),
            landing_page_url: Some("https://example.com/chat".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_apply_when_unset() {
        let caps = minimal();
        assert_eq!(caps.timezone(), "America/New_York");
        assert_eq!(caps.poll_interval(), Duration::from_millis(100));
        assert!(caps.user_agent().starts_with("Mozilla/5.0"));
        assert_eq!(caps.fallback_locales(), None);
    }

    #[test]
    fn base_url_derived_from_environment() {
        let caps = minimal();
        assert_eq!(
            caps.base_url().unwrap(),
            "https://prod2-live-chat.sprinklr.com/api/livechat/v1"
        );
    }

    #[test]
    fn base_url_override_trims_trailing_slash() {
        let mut caps = minimal();
        caps.api_base_url = Some("http://127.0.0.1:9000/api/".to_string());
        assert_eq!(caps.base_url().unwrap(), "http://127.0.0.1:9000/api");
    }

    #[test]
    fn deserializes_capability_keys() {
        let caps: Capabilities = serde_json::from_value(json!({
            "SPRINKL_ENVIRONMENT": "prod0",
            "SPRINKL_APP_ID": "a",
            "SPRINKL_LANDING_PAGE_URL": "https://p",
            "SPRINKL_RESPONSE_POLL_INTERVAL": 250,
            "SPRINKL_CHAT_USER": "{\"userId\":\"u-9\"}"
        }))
        .unwrap();
        assert_eq!(caps.environment, Some(Environment::Prod0));
        assert_eq!(caps.poll_interval(), Duration::from_millis(250));
        assert_eq!(caps.chat_user().unwrap().unwrap().user_id.as_deref(), Some("u-9"));
    }

    #[test]
    fn validate_requires_core_keys() {
        let mut caps = minimal();
        caps.app_id = Some("  ".to_string());
        assert_eq!(caps.validate(), Err(ValidationError::Missing(APP_ID)));

        let caps = Capabilities::default();
        assert_eq!(caps.validate(), Err(ValidationError::Missing(ENVIRONMENT)));
    }

    #[test]
    fn chat_user_without_api_key_fails_validation() {
        let mut caps = minimal();
        caps.chat_user = Some(json!({ "userId": "u1" }));
        assert_eq!(caps.validate(), Err(ValidationError::ChatUserWithoutApiKey));

        caps.api_key = Some("secret".to_string());
        assert_eq!(caps.validate(), Ok(()));
    }

    #[test]
    fn invalid_context_json_fails_validation() {
        let mut caps = minimal();
        caps.custom_context = Some(Value::String("{not json".to_string()));
        assert!(matches!(
            caps.validate(),
            Err(ValidationError::InvalidJson { key: CUSTOM_CONTEXT, .. })
        ));

        caps.custom_context = Some(json!([1, 2]));
        assert_eq!(
            caps.validate(),
            Err(ValidationError::NotAnObject { key: CUSTOM_CONTEXT })
        );
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut caps = minimal();
        let env: HashMap<&str, &str> = HashMap::from([
            (ENVIRONMENT, "PROD4"),
            (APP_ID, " app-from-env "),
            (RESPONSE_POLL_INTERVAL, "500"),
            (API_KEY, ""),
            (STARTED_BY_CONTEXT, "{\"source\":\"test\"}"),
        ]);
        caps.apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(caps.environment, Some(Environment::Prod4));
        assert_eq!(caps.app_id(), "app-from-env");
        assert_eq!(caps.poll_interval(), Duration::from_millis(500));
        assert_eq!(caps.api_key(), None);
        assert_eq!(
            caps.started_by_context().unwrap(),
            Some(json!({ "source": "test" }))
        );
    }

    #[test]
    fn override_with_bad_interval_is_rejected() {
        let mut caps = minimal();
        let err = caps
            .apply_overrides(|k| (k == RESPONSE_POLL_INTERVAL).then(|| "soon".to_string()))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidValue {
                key: RESPONSE_POLL_INTERVAL,
                value: "soon".to_string()
            }
        );
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("livechat-caps-does-not-exist.json");
        let (_caps, used) = load_capabilities(Some(path.clone())).unwrap();
        assert_eq!(used, path);
    }
}
