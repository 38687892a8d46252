use std::fmt::Display;
use std::net::SocketAddr;

use axum::extract::FromRef;
use secrecy::Secret;

use crate::config::environment::Environment;
use crate::config::features::FeatureSettings;
use crate::config::tokens::JwtSettings;
use crate::config::Settings;
use crate::utils::activities::store::ActivityBackend;

pub mod database;
pub mod extractors;

/// Everything the app needs at startup, assembled once from settings (or
/// handed in piecewise by tests).
pub struct Modules {
    pub addr: SocketAddr,
    pub backend: ActivityBackend,
    pub jwt: JwtSettings,
    pub features: FeatureSettings,
    pub environment: Environment,
}

impl Modules {
    pub async fn load_from_settings(settings: Settings) -> Self {
        let pool = database::get_postgres_pool(settings.postgres).await;

        Self {
            addr: settings.app.addr,
            backend: ActivityBackend::postgres(pool),
            jwt: settings.jwt,
            features: settings.features,
            environment: settings.environment,
        }
    }

    pub fn use_custom(
        backend: ActivityBackend,
        addr: SocketAddr,
        access_secret: Secret<String>,
        features: FeatureSettings,
        environment: Environment,
    ) -> Self {
        Self {
            addr,
            backend,
            jwt: JwtSettings {
                secret: access_secret,
            },
            features,
            environment,
        }
    }

    pub fn state(&self) -> AppState {
        AppState {
            environment: self.environment,
            features: self.features.clone(),
            backend: self.backend.clone(),
        }
    }

    pub fn extensions(&self) -> AppExtensions {
        AppExtensions {
            jwt: self.jwt.clone(),
        }
    }
}

#[derive(Clone, FromRef)]
pub struct AppState {
    pub environment: Environment,
    pub features: FeatureSettings,
    pub backend: ActivityBackend,
}

impl Display for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "state ({}, activities v2 {})",
            self.environment,
            if self.features.activities_v2_enabled {
                "enabled"
            } else {
                "disabled"
            }
        )
    }
}

pub struct AppExtensions {
    pub jwt: JwtSettings,
}

impl Display for AppExtensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "extensions (jwt)")
    }
}
