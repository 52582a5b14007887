use std::str::FromStr;
use std::time::Duration;

use anyhow::{Result, anyhow};
use whisper_types::ChatSettings;

use crate::typing::DEFAULT_TYPING_WINDOW;

/// Chat store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Id of the local user: sender of `send_message`, reader of `mark_read`.
    pub user_id: String,
    /// Settings given to newly created chats.
    pub default_settings: ChatSettings,
    pub typing_window: Duration,
    /// Buffered change notifications per subscriber before it starts lagging.
    pub event_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            user_id: "me".into(),
            default_settings: ChatSettings::default(),
            typing_window: DEFAULT_TYPING_WINDOW,
            event_capacity: 1024,
        }
    }
}

impl StoreConfig {
    /// Read `WHISPER_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let default_settings = ChatSettings {
            auto_delete: env_or("WHISPER_DEFAULT_AUTO_DELETE", defaults.default_settings.auto_delete)?,
            delete_timer_ms: env_or(
                "WHISPER_DEFAULT_DELETE_TIMER_MS",
                defaults.default_settings.delete_timer_ms,
            )?,
            encryption_enabled: env_or(
                "WHISPER_DEFAULT_ENCRYPTION",
                defaults.default_settings.encryption_enabled,
            )?,
            muted: false,
        };

        Ok(Self {
            user_id: std::env::var("WHISPER_USER_ID").unwrap_or(defaults.user_id),
            default_settings,
            typing_window: Duration::from_millis(env_or(
                "WHISPER_TYPING_WINDOW_MS",
                defaults.typing_window.as_millis() as u64,
            )?),
            event_capacity: defaults.event_capacity,
        })
    }
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid {}={:?}: {}", name, raw, e)),
        Err(_) => Ok(default),
    }
}
