use crate::config::{get_secret_env, try_get_secret_env};
use secrecy::Secret;
use serde::Deserialize;
use tracing::warn;

pub const NAME_ACCESS_SECRET: &str = "JWT_ACCESS_SECRET";

const DEV_SECRET: &str = "SECRET";

#[derive(Deserialize)]
pub struct JwtSettingsModel {
    pub secret: Option<String>,
}

impl JwtSettingsModel {
    pub fn to_settings(self) -> JwtSettings {
        let secret = self.secret.map(Secret::new).unwrap_or_else(|| {
            try_get_secret_env(NAME_ACCESS_SECRET).unwrap_or_else(|| {
                warn!("Using development jwt secret!");
                Secret::new(DEV_SECRET.to_string())
            })
        });
        JwtSettings { secret }
    }
}

#[derive(Clone)]
pub struct JwtSettings {
    pub secret: Secret<String>,
}

impl JwtSettings {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: Secret::new(secret.to_string()),
        }
    }

    pub fn from_env() -> Self {
        Self {
            secret: get_secret_env(NAME_ACCESS_SECRET),
        }
    }
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self::new(DEV_SECRET)
    }
}
