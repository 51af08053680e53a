use anyhow::Result;
use config::{Config, File};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use crate::args::Args;
use crate::auth::Credentials;
use crate::error::SyncError;
use crate::job::DEFAULT_PAGE_SIZE;
use tracing::{info, debug};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Cfg {
    pub api_base_url: String,
    pub token_url: String,
    pub per_page: u32,
    pub checkpoint_path: String,
    pub output_csv: OutputCsvConfig,
    pub agent: AgentConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OutputCsvConfig {
    pub path: String,
    pub ensure: bool,
}

/// OpenAI-compatible chat endpoint used by `ask`.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AgentConfig {
    pub base_url: String,
    pub model: String,
    /// Cap on rows sent with the prompt, counted from the end of the file.
    /// `None` sends the whole export.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rows: Option<usize>,
}

impl Cfg {
    pub fn load(args: &Args) -> Result<Self> {
        info!("Loading configuration from: {}", args.config);

        let mut cfg = Cfg::default();

        if std::path::Path::new(&args.config).exists() {
            let config = Config::builder()
                .add_source(File::with_name(&args.config).required(false))
                .build()?;

            if let Ok(api_base_url) = config.get_string("api_base_url") {
                cfg.api_base_url = api_base_url;
            }
            if let Ok(token_url) = config.get_string("token_url") {
                cfg.token_url = token_url;
            }
            if let Ok(per_page) = config.get_int("per_page") {
                cfg.per_page = u32::try_from(per_page)
                    .map_err(|_| anyhow::anyhow!("per_page out of range: {}", per_page))?;
            }
            if let Ok(checkpoint_path) = config.get_string("checkpoint_path") {
                cfg.checkpoint_path = checkpoint_path;
            }
            if let Ok(output_path) = config.get_string("output_csv.path") {
                cfg.output_csv.path = output_path;
            }
            if let Ok(ensure) = config.get_bool("output_csv.ensure") {
                cfg.output_csv.ensure = ensure;
            }
            if let Ok(base_url) = config.get_string("agent.base_url") {
                cfg.agent.base_url = base_url;
            }
            if let Ok(model) = config.get_string("agent.model") {
                cfg.agent.model = model;
            }
            if let Ok(max_rows) = config.get_int("agent.max_rows") {
                cfg.agent.max_rows = Some(
                    usize::try_from(max_rows)
                        .map_err(|_| anyhow::anyhow!("agent.max_rows out of range: {}", max_rows))?,
                );
            }
            debug!("Loaded configuration from file");
        } else {
            debug!("Config file not found, using defaults");
        }

        if let Some(csv_path) = &args.csv_path {
            debug!("Overriding csv_path from command line");
            cfg.output_csv.path = csv_path.clone();
        }
        if let Some(checkpoint_path) = &args.checkpoint_path {
            debug!("Overriding checkpoint_path from command line");
            cfg.checkpoint_path = checkpoint_path.clone();
        }

        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            cfg.agent.base_url = base_url;
        }
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            cfg.agent.model = model;
        }

        debug!("Final configuration: {:?}", cfg);
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.is_empty() {
            anyhow::bail!("api_base_url cannot be empty");
        }
        if self.token_url.is_empty() {
            anyhow::bail!("token_url cannot be empty");
        }
        if self.per_page == 0 || self.per_page > 200 {
            anyhow::bail!("per_page must be between 1 and 200, found: {}", self.per_page);
        }
        if self.checkpoint_path.is_empty() {
            anyhow::bail!("checkpoint_path cannot be empty");
        }
        if self.output_csv.path.is_empty() {
            anyhow::bail!("output_csv.path cannot be empty");
        }
        if self.agent.max_rows == Some(0) {
            anyhow::bail!("agent.max_rows must be at least 1 when set");
        }

        info!("Configuration validation passed");
        Ok(())
    }
}

impl Default for Cfg {
    fn default() -> Self {
        Self {
            api_base_url: "https://www.strava.com/api/v3".to_string(),
            token_url: "https://www.strava.com/oauth/token".to_string(),
            per_page: DEFAULT_PAGE_SIZE,
            checkpoint_path: "activity_metadata.json".to_string(),
            output_csv: OutputCsvConfig {
                path: "activities.csv".to_string(),
                ensure: true,
            },
            agent: AgentConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                max_rows: None,
            },
        }
    }
}

/// Read the OAuth credentials. All three are required and checked before any
/// network call.
pub fn credentials_from_env() -> Result<Credentials, SyncError> {
    credentials_from_env_with(|k| std::env::var(k).ok())
}

pub fn credentials_from_env_with<F>(mut get: F) -> Result<Credentials, SyncError>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut required = |key: &str| {
        get(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| SyncError::Config(format!("{key} missing")))
    };
    let client_id = required("STRAVA_CLIENT_ID")?;
    let client_secret = required("STRAVA_CLIENT_SECRET")?;
    let refresh_token = required("STRAVA_REFRESH_TOKEN")?;
    Ok(Credentials {
        client_id,
        client_secret: SecretString::new(client_secret.into()),
        refresh_token: SecretString::new(refresh_token.into()),
    })
}

pub fn agent_api_key_from_env() -> Result<SecretString, SyncError> {
    std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(|v| SecretString::new(v.into()))
        .ok_or_else(|| SyncError::Config("OPENAI_API_KEY missing".into()))
}
