use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::protocol::{DEFAULT_COMMAND_TOPIC, DEFAULT_STATUS_TOPIC};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_true")]
    pub tls: bool,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Inbound status messages buffered between the MQTT loop and the relay
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// How long a command publish waits for the broker's PUBACK
    #[serde(default = "default_ack_timeout_secs")]
    pub ack_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    #[serde(default = "default_command_topic")]
    pub command_topic: String,
    #[serde(default = "default_status_topic")]
    pub status_topic: String,
    /// Shared secret the firmware compares against
    #[serde(default = "default_token")]
    pub token: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Empty means every user may trigger the feeder
    #[serde(default)]
    pub allowed_user_ids: Vec<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BridgeConfig {
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub case_insensitive_keywords: bool,
    /// Sent to the sender before publishing; empty disables it
    #[serde(default = "default_ack_text")]
    pub ack_text: String,
    #[serde(default = "default_confirmation_text")]
    pub confirmation_text: String,
    /// `{status}` is replaced with the raw device status
    #[serde(default = "default_status_template")]
    pub status_template: String,
    /// Status value that makes the relay publish another dispense command
    #[serde(default)]
    pub echo_on_status: Option<String>,
    #[serde(default)]
    pub max_recipients: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default = "default_qr_image_path")]
    pub qr_image_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HeartbeatConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_heartbeat_cron")]
    pub cron: String,
}

fn default_true() -> bool {
    true
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    8883
}

fn default_client_id() -> String {
    format!("petfeeder-bridge-{}", uuid::Uuid::new_v4())
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_channel_capacity() -> usize {
    64
}

fn default_ack_timeout_secs() -> u64 {
    10
}

fn default_command_topic() -> String {
    DEFAULT_COMMAND_TOPIC.to_string()
}

fn default_status_topic() -> String {
    DEFAULT_STATUS_TOPIC.to_string()
}

fn default_token() -> String {
    "abc123".to_string()
}

fn default_keywords() -> Vec<String> {
    vec!["Dispensar".to_string(), "dispensar".to_string()]
}

fn default_ack_text() -> String {
    "Dispensando...".to_string()
}

fn default_confirmation_text() -> String {
    "Dispensado correctamente".to_string()
}

fn default_status_template() -> String {
    "Estado del dispositivo: {status}".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_qr_image_path() -> PathBuf {
    PathBuf::from("bot.qr.png")
}

fn default_heartbeat_cron() -> String {
    "0 0 * * * *".to_string()
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            username: None,
            password: None,
            tls: true,
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive_secs(),
            channel_capacity: default_channel_capacity(),
            ack_timeout_secs: default_ack_timeout_secs(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            command_topic: default_command_topic(),
            status_topic: default_status_topic(),
            token: default_token(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            case_insensitive_keywords: false,
            ack_text: default_ack_text(),
            confirmation_text: default_confirmation_text(),
            status_template: default_status_template(),
            echo_on_status: None,
            max_recipients: None,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            qr_image_path: default_qr_image_path(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron: default_heartbeat_cron(),
        }
    }
}

impl Config {
    /// Load from a TOML file (defaults if it does not exist), then apply
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Override file values with the deployment's environment variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("MQTT_HOST") {
            self.mqtt.host = host;
        }
        if let Some(port) = lookup("MQTT_PORT") {
            self.mqtt.port = port
                .parse()
                .with_context(|| format!("Invalid MQTT_PORT: {}", port))?;
        }
        if let Some(user) = lookup("MQTT_USER") {
            self.mqtt.username = Some(user);
        }
        if let Some(pass) = lookup("MQTT_PASS") {
            self.mqtt.password = Some(pass);
        }
        if let Some(token) = lookup("TOKEN") {
            self.device.token = token;
        }
        if let Some(port) = lookup("PORT") {
            self.http.port = port
                .parse()
                .with_context(|| format!("Invalid PORT: {}", port))?;
        }
        if let Some(bot_token) = lookup("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = bot_token;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.device.token.is_empty() {
            anyhow::bail!("device.token must not be empty");
        }
        if self.device.command_topic.is_empty() || self.device.status_topic.is_empty() {
            anyhow::bail!("device topics must not be empty");
        }
        if self.bridge.keywords.iter().all(|k| k.trim().is_empty()) {
            anyhow::bail!("bridge.keywords needs at least one keyword");
        }
        Ok(())
    }
}
