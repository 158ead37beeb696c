use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub scheduling: SchedulingRules,
    pub notifications: NotificationSettings,
    pub redis_url: Option<String>,
}

/// Business limits applied by the scheduling core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingRules {
    /// Sum of open minutes a practitioner must keep across their week.
    pub min_weekly_availability_minutes: i64,
    pub max_appointment_duration_minutes: i32,
    /// How many times a write that lost a race is replayed with fresh reads.
    pub conflict_retry_attempts: u32,
}

impl Default for SchedulingRules {
    fn default() -> Self {
        Self {
            min_weekly_availability_minutes: 240,
            max_appointment_duration_minutes: 240,
            conflict_retry_attempts: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub webhook_url: Option<String>,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub default_channel: String,
    /// How long finished delivery records stay in the ledger.
    pub retention_secs: u64,
    /// Deliveries the webhook worker runs at once.
    pub max_in_flight: usize,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            max_attempts: 3,
            backoff_ms: 500,
            default_channel: "email".to_string(),
            retention_secs: 7 * 24 * 60 * 60,
            max_in_flight: 8,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scheduling: SchedulingRules::default(),
            notifications: NotificationSettings::default(),
            redis_url: None,
        }
    }
}

impl AppConfig {
    /// Applies a `.env` file if one is present, then reads the environment.
    pub fn load() -> Self {
        dotenv::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> Self {
        let rules = SchedulingRules::default();
        let notify = NotificationSettings::default();

        let config = Self {
            scheduling: SchedulingRules {
                min_weekly_availability_minutes: parse_var(
                    "MIN_WEEKLY_AVAILABILITY_MINUTES",
                    rules.min_weekly_availability_minutes,
                ),
                max_appointment_duration_minutes: parse_var(
                    "MAX_APPOINTMENT_DURATION_MINUTES",
                    rules.max_appointment_duration_minutes,
                ),
                conflict_retry_attempts: parse_var(
                    "CONFLICT_RETRY_ATTEMPTS",
                    rules.conflict_retry_attempts,
                ),
            },
            notifications: NotificationSettings {
                webhook_url: optional_var("NOTIFICATION_WEBHOOK_URL"),
                max_attempts: parse_var("NOTIFICATION_MAX_ATTEMPTS", notify.max_attempts),
                backoff_ms: parse_var("NOTIFICATION_BACKOFF_MS", notify.backoff_ms),
                default_channel: env::var("NOTIFICATION_CHANNEL")
                    .unwrap_or(notify.default_channel),
                retention_secs: parse_var("NOTIFICATION_RETENTION_SECS", notify.retention_secs),
                max_in_flight: parse_var("NOTIFICATION_MAX_IN_FLIGHT", notify.max_in_flight),
            },
            redis_url: optional_var("REDIS_URL"),
        };

        if !config.is_notification_webhook_configured() {
            warn!("NOTIFICATION_WEBHOOK_URL not set, notifications stay in the local outbox");
        }
        if !config.is_cache_configured() {
            warn!("REDIS_URL not set, appointment cache invalidation is a no-op");
        }

        config
    }

    pub fn is_notification_webhook_configured(&self) -> bool {
        self.notifications
            .webhook_url
            .as_deref()
            .is_some_and(|url| !url.is_empty())
    }

    pub fn is_cache_configured(&self) -> bool {
        self.redis_url.as_deref().is_some_and(|url| !url.is_empty())
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match env::var(key) {
        Ok(raw) => parse_or_default(key, &raw, default),
        Err(_) => default,
    }
}

fn parse_or_default<T>(key: &str, raw: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    raw.trim().parse().unwrap_or_else(|_| {
        warn!("{} has invalid value {:?}, using default {}", key, raw, default);
        default
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_clinic_policy() {
        let config = AppConfig::default();
        assert_eq!(config.scheduling.min_weekly_availability_minutes, 240);
        assert_eq!(config.scheduling.conflict_retry_attempts, 1);
        assert_eq!(config.notifications.max_attempts, 3);
        assert_eq!(config.notifications.retention_secs, 604_800);
        assert!(!config.is_cache_configured());
        assert!(!config.is_notification_webhook_configured());
    }

    #[test]
    fn invalid_numbers_fall_back_to_default() {
        assert_eq!(parse_or_default("X", "abc", 240i64), 240);
        assert_eq!(parse_or_default("X", " 300 ", 240i64), 300);
    }
}
