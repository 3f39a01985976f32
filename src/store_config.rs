//! Process-wide store configuration from environment variables.
//!
//! Connection parameters are read once at process start and are immutable
//! afterwards. `CUSTOMER_STORE_PROJECT_ID` is required; the remaining
//! variables are carried for hosted deployments and logged at startup.

use std::env;
use std::sync::OnceLock;

use log::info;

use crate::app_response::AppResponse;

const ENV_API_KEY: &str = "CUSTOMER_STORE_API_KEY";
const ENV_AUTH_DOMAIN: &str = "CUSTOMER_STORE_AUTH_DOMAIN";
const ENV_DATABASE_URL: &str = "CUSTOMER_STORE_DATABASE_URL";
const ENV_PROJECT_ID: &str = "CUSTOMER_STORE_PROJECT_ID";
const ENV_STORAGE_BUCKET: &str = "CUSTOMER_STORE_STORAGE_BUCKET";
const ENV_APP_ID: &str = "CUSTOMER_STORE_APP_ID";

static CONFIG: OnceLock<StoreConfig> = OnceLock::new();

/// Connection parameters for the customer store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub api_key: String,
    pub auth_domain: String,
    pub database_url: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub app_id: String,
}

impl StoreConfig {
    /// Read the configuration from the environment. Only `project_id` is
    /// mandatory; everything else defaults to empty.
    pub fn from_env() -> Result<Self, AppResponse> {
        let project_id = env::var(ENV_PROJECT_ID).map_err(|_| {
            AppResponse::ValidationError(format!("{ENV_PROJECT_ID} is not set"))
        })?;

        Ok(StoreConfig {
            api_key: env::var(ENV_API_KEY).unwrap_or_default(),
            auth_domain: env::var(ENV_AUTH_DOMAIN).unwrap_or_default(),
            database_url: env::var(ENV_DATABASE_URL).unwrap_or_default(),
            project_id,
            storage_bucket: env::var(ENV_STORAGE_BUCKET).unwrap_or_default(),
            app_id: env::var(ENV_APP_ID).unwrap_or_default(),
        })
    }

    /// The process-wide configuration, loaded on first use and immutable
    /// thereafter.
    pub fn global() -> Result<&'static StoreConfig, AppResponse> {
        if let Some(config) = CONFIG.get() {
            return Ok(config);
        }
        let config = Self::from_env()?;
        info!(
            "Loaded store configuration for project '{}' (app id '{}')",
            config.project_id, config.app_id
        );
        Ok(CONFIG.get_or_init(|| config))
    }

    /// On-disk database location. An explicit `database_url` wins; otherwise
    /// the path is derived from the project id.
    pub fn database_path(&self) -> String {
        if self.database_url.is_empty() {
            format!("{}.redb", self.project_id)
        } else {
            self.database_url.clone()
        }
    }
}
