use crate::config::{get_env, try_get_env};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use tracing::info;

pub const NAME_POSTGRES: &str = "DATABASE_URL";

#[derive(Deserialize, Clone)]
pub struct DatabaseFieldsModel {
    username: Option<String>,
    password: Option<String>,
    port: Option<u16>,
    host: Option<String>,
    database_name: Option<String>,
}

impl DatabaseFieldsModel {
    fn compose_url(self) -> String {
        let username = self.username.unwrap_or_else(|| "postgres".to_string());
        let password = Secret::new(self.password.unwrap_or_default());
        let port = self.port.unwrap_or(5432);
        let host = self.host.unwrap_or_else(|| "localhost".to_string());
        let database_name = self.database_name.unwrap_or_else(|| "tripsync".to_string());

        format!(
            "postgresql://{username}:{}@{host}:{port}/{database_name}",
            password.expose_secret(),
        )
    }
}

#[derive(Deserialize)]
pub struct PostgresSettingsModel {
    database_url: Option<String>,
    fields: Option<DatabaseFieldsModel>,
    is_migrating: Option<bool>,
}

impl PostgresSettingsModel {
    pub fn to_settings(self) -> PostgresSettings {
        let database_url = if let Some(fields) = self.fields {
            info!("Using composed postgres url");
            fields.compose_url()
        } else if let Some(url) = self.database_url {
            info!("Using field postgres url");
            url
        } else {
            info!("Using env postgres url");
            try_get_env(NAME_POSTGRES).expect("No connection info provided")
        };

        PostgresSettings {
            database_url,
            is_migrating: self.is_migrating.unwrap_or(false),
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct PostgresSettings {
    pub database_url: String,
    pub is_migrating: bool,
}

impl PostgresSettings {
    pub fn from_env() -> Self {
        Self {
            database_url: get_env(NAME_POSTGRES),
            is_migrating: true,
        }
    }
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            database_url: get_env(NAME_POSTGRES),
            is_migrating: false,
        }
    }
}
