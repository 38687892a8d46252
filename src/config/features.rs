use crate::config::try_get_env;
use serde::Deserialize;
use tracing::info;

pub const NAME_ACTIVITIES_V2: &str = "ACTIVITIES_V2_ENABLED";

/// Rollout switches. `activities_v2_enabled` arms the v2 persistence
/// pipeline; individual clients still have to opt in per request with the
/// `x-activities-version: 2` header.
#[derive(Deserialize, Clone, Default)]
pub struct FeatureSettings {
    #[serde(default)]
    pub activities_v2_enabled: bool,
}

#[derive(Deserialize)]
pub struct FeatureSettingsModel {
    pub activities_v2_enabled: Option<bool>,
}

impl FeatureSettingsModel {
    pub fn to_settings(self) -> FeatureSettings {
        let enabled = self.activities_v2_enabled.unwrap_or(false);
        if enabled {
            info!("Activities v2 pipeline armed");
        }
        FeatureSettings {
            activities_v2_enabled: enabled,
        }
    }
}

impl FeatureSettings {
    pub fn from_env() -> Self {
        Self {
            activities_v2_enabled: try_get_env(NAME_ACTIVITIES_V2)
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}
