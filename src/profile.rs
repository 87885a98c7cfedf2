//! Diner profile: who the reservation is for.
//!
//! Persisted as JSON at `<config dir>/bookaboo/profile.json` with owner-only
//! permissions on Unix. A missing or unreadable file falls back to the
//! built-in defaults so the pipeline never blocks on profile state.

use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

const APP_DIR: &str = "bookaboo";
const PROFILE_FILE: &str = "profile.json";

/// Per-user configuration directory, shared with the local event store.
pub(crate) fn app_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR))
}

fn profile_path() -> Option<PathBuf> {
    app_config_dir().map(|dir| dir.join(PROFILE_FILE))
}

/// The diner's identity and booking preferences.
///
/// Read-only to the reservation pipeline: the parser takes the preference
/// fields as fallbacks and the phone-call script interpolates the identity
/// fields, but nothing in the pipeline mutates the profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    /// Fallback party size when the request text carries no number.
    pub party_size: u32,
    /// Fallback reservation time when the request text carries none.
    #[serde(with = "hhmm")]
    pub preferred_time: NaiveTime,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            first_name: "Devin".to_string(),
            last_name: "Pillemer".to_string(),
            email: "devin.pillemer@gmail.com".to_string(),
            phone: "+972-50-724-2120".to_string(),
            party_size: 2,
            preferred_time: NaiveTime::from_hms_opt(20, 0, 0).unwrap_or_default(),
        }
    }
}

impl UserProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Load the profile from the default location, falling back to the
    /// built-in defaults when the file is missing or unreadable.
    pub async fn load() -> Self {
        match profile_path() {
            Some(path) => Self::load_from(&path).await,
            None => Self::default(),
        }
    }

    /// Load the profile from an explicit path.
    pub async fn load_from(path: &Path) -> Self {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(profile) => profile,
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "profile file is corrupt, using defaults"
                    );
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Persist the profile to the default location.
    pub async fn save(&self) -> std::io::Result<PathBuf> {
        let path = profile_path().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no user configuration directory available",
            )
        })?;
        self.save_to(&path).await?;
        Ok(path)
    }

    /// Persist the profile to an explicit path, creating parent directories
    /// and restricting permissions to the owner on Unix.
    pub async fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(self)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        tokio::fs::write(path, contents).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(path, perms).await?;
        }

        Ok(())
    }
}

/// Serde adapter storing times as `HH:MM`, the format the profile file has
/// always used. Accepts `HH:MM:SS` too.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(|_| D::Error::custom(format!("invalid time of day: {raw:?}")))
    }
}
