use std::env;
use std::time::Duration;

use opslock_core::{AppError, AppResult};

/// Lease timing configuration for [`EventService`](crate::EventService).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventServiceConfig {
    /// Interval between heartbeat lease refreshes.
    pub lock_update_interval: Duration,
    /// Lease age beyond which a live lock is presumed dead and reclaimable.
    pub lock_expire_timeout: Duration,
}

impl Default for EventServiceConfig {
    fn default() -> Self {
        Self {
            lock_update_interval: Duration::from_secs(30),
            lock_expire_timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl EventServiceConfig {
    /// Loads configuration from the environment, falling back to defaults.
    ///
    /// Recognised variables: `EVENT_LOCK_UPDATE_INTERVAL_MS` and
    /// `EVENT_LOCK_EXPIRE_SECONDS`.
    pub fn from_env() -> AppResult<Self> {
        let config = Self {
            lock_update_interval: Duration::from_millis(parse_env_u64(
                "EVENT_LOCK_UPDATE_INTERVAL_MS",
                30_000,
            )?),
            lock_expire_timeout: Duration::from_secs(parse_env_u64(
                "EVENT_LOCK_EXPIRE_SECONDS",
                1_800,
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the interval/timeout relationship.
    pub fn validate(&self) -> AppResult<()> {
        if self.lock_update_interval.is_zero() {
            return Err(AppError::Validation(
                "lock_update_interval must be greater than zero".to_owned(),
            ));
        }

        if self.lock_expire_timeout.is_zero() {
            return Err(AppError::Validation(
                "lock_expire_timeout must be greater than zero".to_owned(),
            ));
        }

        if self.lock_update_interval >= self.lock_expire_timeout {
            return Err(AppError::Validation(
                "lock_update_interval must be shorter than lock_expire_timeout".to_owned(),
            ));
        }

        Ok(())
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::EventServiceConfig;

    #[test]
    fn defaults_follow_the_one_to_sixty_convention() {
        let config = EventServiceConfig::default();
        assert_eq!(config.lock_update_interval, Duration::from_secs(30));
        assert_eq!(config.lock_expire_timeout, Duration::from_secs(1_800));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_values() {
        let config = EventServiceConfig {
            lock_update_interval: Duration::ZERO,
            ..EventServiceConfig::default()
        };
        assert!(config.validate().is_err());

        let config = EventServiceConfig {
            lock_expire_timeout: Duration::ZERO,
            ..EventServiceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_interval_not_shorter_than_timeout() {
        let config = EventServiceConfig {
            lock_update_interval: Duration::from_secs(60),
            lock_expire_timeout: Duration::from_secs(60),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_env_falls_back_to_defaults() {
        assert_eq!(
            EventServiceConfig::from_env().unwrap(),
            EventServiceConfig::default()
        );
    }
}
