use serde;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub app_port: u16,
    pub app_host: String,
    pub auth_url: String,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub relay: RelaySettings,
    #[serde(default)]
    pub providers: ProviderSettings,
    #[serde(default)]
    pub models: Vec<ModelSettings>,
    #[serde(default)]
    pub title: TitleSettings,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `development` or `production`.",
                other
            )),
        }
    }
}

/// Tuning for the streaming relay.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RelaySettings {
    /// Upper bound on the wait for the first fragment from a provider.
    pub first_fragment_timeout_secs: u64,
    /// Buffered parts between the provider task and the HTTP body.
    pub channel_capacity: usize,
    /// Attempts to persist a completed assistant reply.
    pub save_attempts: u32,
    /// Linear backoff step between save attempts.
    pub save_backoff_ms: u64,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            first_fragment_timeout_secs: 30,
            channel_capacity: 32,
            save_attempts: 3,
            save_backoff_ms: 200,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ProviderEndpoint {
    pub base_url: String,
    /// Taken from the environment, never from the yaml file
    #[serde(skip)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ProviderSettings {
    pub openai: ProviderEndpoint,
    pub google: ProviderEndpoint,
    pub lmstudio: ProviderEndpoint,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            openai: ProviderEndpoint {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: None,
            },
            google: ProviderEndpoint {
                base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                api_key: None,
            },
            lmstudio: ProviderEndpoint {
                base_url: "http://localhost:1234/v1".to_string(),
                api_key: None,
            },
        }
    }
}

impl ProviderSettings {
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.openai.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
            self.google.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("LMSTUDIO_BASE_URL") {
            self.lmstudio.base_url = url;
        }
    }
}

/// One entry of the model catalogue.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ModelSettings {
    pub id: i32,
    pub slug: String,
    pub display_name: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct TitleSettings {
    pub enabled: bool,
    pub model_slug: String,
    pub max_length: usize,
}

impl Default for TitleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            model_slug: "openai:gpt-4o-mini".to_string(),
            max_length: 40,
        }
    }
}

impl DatabaseSettings {
    // Connection string: postgresql://<username>:<password>@<host>:<port>/<database_name>
    pub fn connection_string(&self) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name,
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgresql://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port,
        )
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration"))
        .add_source(config::Environment::with_prefix("APP").separator("__"))
        .build()?;

    let mut config: Settings = settings.try_deserialize()?;

    if let Ok(value) = std::env::var("APP_ENVIRONMENT") {
        config.environment = value.parse().map_err(config::ConfigError::Message)?;
    }
    config.providers.apply_env();

    Ok(config)
}
