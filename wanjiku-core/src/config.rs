use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;

use crate::menu::ELLIPSIS;

/// Longest sliding expiry accepted for a USSD session.
pub const MAX_SESSION_TTL_SECONDS: i64 = 86_400;

#[derive(Debug, Deserialize, Clone)]
pub struct WanjikuConfig {
    pub service: ServiceConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub responder: ResponderConfig,
    #[serde(default)]
    pub messenger: MessengerConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub name: String,
    pub log_level: String,
}

/// Storage backend selection. `backend` is either "postgres" or "memory".
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: String,
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            url: String::new(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    /// Sliding expiry applied on every USSD interaction.
    pub ttl_seconds: i64,
    /// How often stale sessions are marked expired. 0 disables the sweep.
    pub sweep_interval_seconds: u64,
    /// Maximum characters per USSD screen for free-text replies.
    pub max_reply_chars: usize,
}

impl SessionConfig {
    /// Reject settings that would make every turn stale or a reply
    /// longer than its budget.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_seconds <= 0 || self.ttl_seconds > MAX_SESSION_TTL_SECONDS {
            return Err(ConfigError::Message(format!(
                "session.ttl_seconds must be between 1 and {}, got {}",
                MAX_SESSION_TTL_SECONDS, self.ttl_seconds
            )));
        }
        if self.max_reply_chars < ELLIPSIS.len() {
            return Err(ConfigError::Message(format!(
                "session.max_reply_chars must be at least {}, got {}",
                ELLIPSIS.len(),
                self.max_reply_chars
            )));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            sweep_interval_seconds: 60,
            max_reply_chars: 160,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ResponderConfig {
    /// "openai" or "none". With "none", free text is answered by intents only.
    pub backend: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub intents: Vec<IntentConfig>,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            backend: "openai".to_string(),
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 200,
            temperature: 0.7,
            max_retries: 2,
            retry_delay_ms: 500,
            intents: Vec::new(),
        }
    }
}

/// Keyword intent answered without calling the language model.
#[derive(Debug, Deserialize, Clone)]
pub struct IntentConfig {
    pub name: String,
    pub keywords: Vec<String>,
    pub response: String,
    #[serde(default)]
    pub services: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MessengerConfig {
    pub username: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub sender_id: Option<String>,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            username: "sandbox".to_string(),
            api_key: None,
            base_url: "https://api.sandbox.africastalking.com".to_string(),
            sender_id: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl WanjikuConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        let config: Self = s.try_deserialize()?;
        config.session.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        let config: Self = s.try_deserialize()?;
        config.session.validate()?;
        Ok(config)
    }

    /// Configuration for tests and local runs: in-memory storage, no sweep.
    pub fn in_memory() -> Self {
        Self {
            service: ServiceConfig {
                name: "wanjiku".to_string(),
                log_level: "info".to_string(),
            },
            database: DatabaseConfig::default(),
            session: SessionConfig {
                sweep_interval_seconds: 0,
                ..SessionConfig::default()
            },
            responder: ResponderConfig::default(),
            messenger: MessengerConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = WanjikuConfig::from_toml_str(
            r#"
            [service]
            name = "wanjiku"
            log_level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.database.backend, "memory");
        assert_eq!(cfg.session.ttl_seconds, 300);
        assert_eq!(cfg.session.max_reply_chars, 160);
        assert_eq!(cfg.responder.model, "gpt-3.5-turbo");
        assert_eq!(cfg.http.port, 8000);
    }

    #[test]
    fn test_intents_parse() {
        let cfg = WanjikuConfig::from_toml_str(
            r#"
            [service]
            name = "wanjiku"
            log_level = "info"

            [responder]
            backend = "none"

            [[responder.intents]]
            name = "birth_certificate"
            keywords = ["kuzaliwa"]
            response = "Cheti cha kuzaliwa hupatikana eCitizen."
            services = ["Cheti cha Kuzaliwa"]
            "#,
        )
        .unwrap();

        assert_eq!(cfg.responder.backend, "none");
        assert_eq!(cfg.responder.intents.len(), 1);
        assert_eq!(cfg.responder.intents[0].keywords, vec!["kuzaliwa"]);
    }

    #[test]
    fn test_missing_service_section_is_error() {
        assert!(WanjikuConfig::from_toml_str("[http]\nhost = \"0.0.0.0\"\nport = 80\n").is_err());
    }

    fn with_session(section: &str) -> Result<WanjikuConfig, ConfigError> {
        WanjikuConfig::from_toml_str(&format!(
            "[service]\nname = \"wanjiku\"\nlog_level = \"info\"\n\n[session]\n{}\n",
            section
        ))
    }

    #[test]
    fn test_session_ttl_must_be_positive_and_bounded() {
        for ttl in ["0", "-10", "9223372036854775807", "86401"] {
            match with_session(&format!("ttl_seconds = {}", ttl)) {
                Err(ConfigError::Message(msg)) => assert!(msg.contains("ttl_seconds"), "{}", msg),
                other => panic!("ttl {} should be rejected, got {:?}", ttl, other.map(|c| c.session)),
            }
        }
        assert_eq!(with_session("ttl_seconds = 86400").unwrap().session.ttl_seconds, 86_400);
    }

    #[test]
    fn test_reply_budget_must_fit_ellipsis() {
        match with_session("max_reply_chars = 2") {
            Err(ConfigError::Message(msg)) => assert!(msg.contains("max_reply_chars"), "{}", msg),
            other => panic!("expected rejection, got {:?}", other.map(|c| c.session)),
        }
        assert_eq!(with_session("max_reply_chars = 3").unwrap().session.max_reply_chars, 3);
    }
}
