//! User-mutable settings persisted alongside the queue.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::quota::CooldownState;

/// Upper bound for the concurrency limit
pub const MAX_CONCURRENCY: u8 = 8;

/// Limit restored by `start()` when the queue was paused
pub const DEFAULT_CONCURRENCY: u8 = 2;

pub const DEFAULT_PERSON_GENERATION: &str = "allow_all";

pub const DEFAULT_COST_CAP_JOBS: u32 = 100;

/// Clamp a requested concurrency limit to [0, MAX_CONCURRENCY]
pub fn clamp_concurrency(n: u32) -> u8 {
    n.min(MAX_CONCURRENCY as u32) as u8
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// API credential; falls back to an environment variable when unset
    pub api_key: Option<String>,
    pub output_dir: PathBuf,
    pub watch_dir: Option<PathBuf>,
    /// Concurrency limit, 0 = paused
    pub concurrency: u8,
    pub person_generation_default: String,
    /// Max dispatch attempts per session
    pub cost_cap_jobs: u32,
    pub quota: CooldownState,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            output_dir: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("Videos")
                .join("Veo3"),
            watch_dir: None,
            concurrency: DEFAULT_CONCURRENCY,
            person_generation_default: DEFAULT_PERSON_GENERATION.to_string(),
            cost_cap_jobs: DEFAULT_COST_CAP_JOBS,
            quota: CooldownState::default(),
        }
    }
}

impl Settings {
    /// Resolve the credential: explicit setting first, then `env_var`.
    pub fn credential(&self, env_var: &str) -> Option<String> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .or_else(|| std::env::var(env_var).ok().filter(|k| !k.trim().is_empty()))
    }

    /// Merge a partial update. Empty strings clear optional fields.
    pub fn apply(&mut self, patch: SettingsPatch) {
        if let Some(api_key) = patch.api_key {
            self.api_key = Some(api_key).filter(|k| !k.trim().is_empty());
        }
        if let Some(output_dir) = patch.output_dir.filter(|d| !d.as_os_str().is_empty()) {
            self.output_dir = output_dir;
        }
        if let Some(watch_dir) = patch.watch_dir {
            self.watch_dir = Some(watch_dir).filter(|d| !d.as_os_str().is_empty());
        }
        if let Some(mode) = patch.person_generation_default.filter(|m| !m.trim().is_empty()) {
            self.person_generation_default = mode.trim().to_string();
        }
        if let Some(cap) = patch.cost_cap_jobs {
            self.cost_cap_jobs = cap;
        }
    }
}

/// Partial settings update; `None` leaves a field untouched.
///
/// The concurrency limit is not part of the patch: it has its own operation
/// because it interacts with the scheduler and the quota cooldown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    pub api_key: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub watch_dir: Option<PathBuf>,
    pub person_generation_default: Option<String>,
    pub cost_cap_jobs: Option<u32>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert_eq!(settings.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(settings.cost_cap_jobs, 100);
        assert_eq!(settings.person_generation_default, "allow_all");
        assert!(settings.output_dir.ends_with("Videos/Veo3"));
        assert!(!settings.quota.active);
    }

    #[test]
    fn test_clamp_concurrency() {
        assert_eq!(clamp_concurrency(0), 0);
        assert_eq!(clamp_concurrency(3), 3);
        assert_eq!(clamp_concurrency(8), 8);
        assert_eq!(clamp_concurrency(100), 8);
    }

    #[test]
    fn test_credential_prefers_setting() {
        let settings = Settings {
            api_key: Some("from-settings".to_string()),
            ..Default::default()
        };
        assert_eq!(
            settings.credential("VIDQUEUE_TEST_UNSET_ENV_VAR").as_deref(),
            Some("from-settings")
        );
    }

    #[test]
    fn test_credential_missing() {
        let settings = Settings {
            api_key: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(settings.credential("VIDQUEUE_TEST_UNSET_ENV_VAR").is_none());
    }

    #[test]
    fn test_apply_patch_merges() {
        let mut settings = Settings::default();
        settings.apply(SettingsPatch {
            api_key: Some("k".to_string()),
            output_dir: Some(PathBuf::from("/tmp/videos")),
            cost_cap_jobs: Some(5),
            ..Default::default()
        });
        assert_eq!(settings.api_key.as_deref(), Some("k"));
        assert_eq!(settings.output_dir, PathBuf::from("/tmp/videos"));
        assert_eq!(settings.cost_cap_jobs, 5);
        assert_eq!(settings.person_generation_default, "allow_all");
        assert_eq!(settings.concurrency, DEFAULT_CONCURRENCY);
    }

    #[test]
    fn test_apply_patch_clears_with_empty_values() {
        let mut settings = Settings {
            api_key: Some("k".to_string()),
            watch_dir: Some(PathBuf::from("/tmp/inbox")),
            ..Default::default()
        };
        settings.apply(SettingsPatch {
            api_key: Some(String::new()),
            watch_dir: Some(PathBuf::new()),
            ..Default::default()
        });
        assert!(settings.api_key.is_none());
        assert!(settings.watch_dir.is_none());
    }

    #[test]
    fn test_settings_deserialize_partial_document() {
        let settings: Settings = serde_json::from_str(r#"{"concurrency": 4}"#).unwrap();
        assert_eq!(settings.concurrency, 4);
        assert_eq!(settings.cost_cap_jobs, DEFAULT_COST_CAP_JOBS);
    }

    #[test]
    fn test_patch_is_empty() {
        assert!(SettingsPatch::default().is_empty());
        let patch = SettingsPatch {
            cost_cap_jobs: Some(1),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }
}
