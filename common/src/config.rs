// Configuration management with layered configuration (file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub twilio: TwilioConfig,
    pub smtp: SmtpConfig,
    pub broadcast: BroadcastConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
    #[serde(default)]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

/// Twilio account used for outbound broadcasts and inbound webhooks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwilioConfig {
    #[serde(default)]
    pub enabled: bool,
    pub account_sid: String,
    pub auth_token: String,
    #[serde(default)]
    pub messaging_service_sid: Option<String>,
    #[serde(default)]
    pub from_number: Option<String>,
    #[serde(default = "default_twilio_api_base_url")]
    pub api_base_url: String,
    /// Public URL Twilio posts delivery status updates to. Also the URL
    /// the status callback signature is computed against.
    #[serde(default)]
    pub status_callback_url: Option<String>,
    /// Public URL of the inbound SMS webhook as configured in Twilio
    #[serde(default)]
    pub inbound_url: Option<String>,
    #[serde(default = "default_twilio_timeout")]
    pub timeout_seconds: u64,
}

fn default_twilio_api_base_url() -> String {
    "https://api.twilio.com".to_string()
}

fn default_twilio_timeout() -> u64 {
    15
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default)]
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub from_address: String,
    pub from_name: String,
    #[serde(default = "default_starttls")]
    pub starttls: bool,
}

fn default_starttls() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Maximum number of in-flight SMS/email deliveries per broadcast
    pub dispatch_concurrency: usize,
    pub retry_max_attempts: u32,
    pub retry_base_delay_seconds: u64,
    pub retry_max_delay_seconds: u64,
    /// Failed deliveries older than this are left alone by the retry worker
    pub retry_window_hours: i64,
    pub retry_poll_interval_seconds: u64,
    /// IANA zone the event runs in; decides the event year and slot times
    pub event_timezone: String,
    pub verification_code_max_sends: u32,
    pub verification_code_window_seconds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    #[serde(default = "default_log_json")]
    pub log_json: bool,
    pub tracing_endpoint: Option<String>,
}

fn default_log_json() -> bool {
    true
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default configuration
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port must be greater than 0".to_string());
        }

        if self.database.url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }

        if self.redis.url.is_empty() {
            return Err("Redis URL cannot be empty".to_string());
        }

        if self.auth.jwt_secret.is_empty() {
            return Err("JWT secret cannot be empty".to_string());
        }

        if self.twilio.enabled {
            if self.twilio.account_sid.is_empty() || self.twilio.auth_token.is_empty() {
                return Err("Twilio account_sid and auth_token are required".to_string());
            }
            if self.twilio.messaging_service_sid.is_none() && self.twilio.from_number.is_none() {
                return Err(
                    "Twilio requires either messaging_service_sid or from_number".to_string(),
                );
            }
        }

        if self.smtp.enabled {
            if self.smtp.host.is_empty() {
                return Err("SMTP host cannot be empty".to_string());
            }
            if self.smtp.from_address.is_empty() {
                return Err("SMTP from_address cannot be empty".to_string());
            }
        }

        if self.broadcast.dispatch_concurrency == 0 {
            return Err("Broadcast dispatch_concurrency must be greater than 0".to_string());
        }
        if self.broadcast.retry_poll_interval_seconds == 0 {
            return Err("Broadcast retry_poll_interval_seconds must be greater than 0".to_string());
        }
        if self.broadcast.event_timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(format!(
                "Invalid event timezone: {}",
                self.broadcast.event_timezone
            ));
        }

        Ok(())
    }

    /// Event timezone, falling back to Pacific time when unparseable
    pub fn event_tz(&self) -> chrono_tz::Tz {
        self.broadcast
            .event_timezone
            .parse()
            .unwrap_or(chrono_tz::America::Los_Angeles)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/clubhouse".to_string(),
                max_connections: 10,
                min_connections: 2,
                connect_timeout_seconds: 30,
                run_migrations: false,
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
            },
            auth: AuthConfig {
                jwt_secret: "change-me-in-production".to_string(),
            },
            twilio: TwilioConfig {
                enabled: false,
                account_sid: String::new(),
                auth_token: String::new(),
                messaging_service_sid: None,
                from_number: None,
                api_base_url: default_twilio_api_base_url(),
                status_callback_url: None,
                inbound_url: None,
                timeout_seconds: default_twilio_timeout(),
            },
            smtp: SmtpConfig {
                enabled: false,
                host: "localhost".to_string(),
                port: 587,
                username: None,
                password: None,
                from_address: "do-not-reply@example.org".to_string(),
                from_name: "Ranger Broadcasting Service".to_string(),
                starttls: true,
            },
            broadcast: BroadcastConfig {
                dispatch_concurrency: 8,
                retry_max_attempts: 5,
                retry_base_delay_seconds: 60,
                retry_max_delay_seconds: 3600,
                retry_window_hours: 24,
                retry_poll_interval_seconds: 60,
                event_timezone: "America/Los_Angeles".to_string(),
                verification_code_max_sends: 3,
                verification_code_window_seconds: 900,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                log_json: true,
                tracing_endpoint: None,
            },
        }
    }
}
