use std::env;
use std::time::Duration;

use crate::surface::Size;

pub const ENV_READINESS_POLL_MS: &str = "VAST_FRAME_READINESS_POLL_MS";
pub const ENV_READINESS_CEILING_MS: &str = "VAST_FRAME_READINESS_CEILING_MS";
pub const ENV_SIZE_SYNC_MS: &str = "VAST_FRAME_SIZE_SYNC_MS";

const DEFAULT_READINESS_POLL: Duration = Duration::from_millis(50);
const DEFAULT_READINESS_CEILING: Duration = Duration::from_secs(10);
const DEFAULT_SIZE_SYNC: Duration = Duration::from_millis(250);

/// Settings shipped to the render host inside the bootstrap document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderHostConfig {
    pub size_sync_interval: Duration,
    /// Used when no measurement source reports a size.
    pub default_size: Size,
}

impl Default for RenderHostConfig {
    fn default() -> Self {
        Self {
            size_sync_interval: DEFAULT_SIZE_SYNC,
            default_size: Size::new(640, 360),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerConfig {
    /// How often the controller checks whether a new frame can be bootstrapped.
    pub readiness_poll_interval: Duration,
    /// Upper bound on that wait when the session has no deadline of its own.
    pub readiness_ceiling: Duration,
    pub render_host: RenderHostConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            readiness_poll_interval: DEFAULT_READINESS_POLL,
            readiness_ceiling: DEFAULT_READINESS_CEILING,
            render_host: RenderHostConfig::default(),
        }
    }
}

impl PlayerConfig {
    /// Defaults overridden by any valid `VAST_FRAME_*` millisecond variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            readiness_poll_interval: env_millis(ENV_READINESS_POLL_MS)
                .unwrap_or(defaults.readiness_poll_interval),
            readiness_ceiling: env_millis(ENV_READINESS_CEILING_MS)
                .unwrap_or(defaults.readiness_ceiling),
            render_host: RenderHostConfig {
                size_sync_interval: env_millis(ENV_SIZE_SYNC_MS)
                    .unwrap_or(defaults.render_host.size_sync_interval),
                ..defaults.render_host
            },
        }
    }
}

fn env_millis(var: &str) -> Option<Duration> {
    env::var(var).ok().and_then(|value| parse_millis(&value))
}

fn parse_millis(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|millis| *millis > 0)
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{LazyLock, Mutex};

    // Environment is process-global; serialize the tests touching it.
    static ENV_MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

    #[test_timeout::timeout]
    fn default_config() {
        let config = PlayerConfig::default();
        assert_eq!(config.readiness_poll_interval, Duration::from_millis(50));
        assert_eq!(config.readiness_ceiling, Duration::from_secs(10));
        assert_eq!(config.render_host.size_sync_interval, Duration::from_millis(250));
        assert_eq!(config.render_host.default_size, Size::new(640, 360));
    }

    #[test_timeout::timeout]
    fn parse_millis_rejects_garbage() {
        assert_eq!(parse_millis(" 120 "), Some(Duration::from_millis(120)));
        assert_eq!(parse_millis("0"), None);
        assert_eq!(parse_millis(""), None);
        assert_eq!(parse_millis("-5"), None);
        assert_eq!(parse_millis("fast"), None);
    }

    #[test_timeout::timeout]
    fn from_env_overrides_and_falls_back() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let saved: Vec<_> = [ENV_READINESS_POLL_MS, ENV_READINESS_CEILING_MS, ENV_SIZE_SYNC_MS]
            .iter()
            .map(|var| (*var, env::var(var).ok()))
            .collect();

        unsafe {
            env::set_var(ENV_READINESS_POLL_MS, "20");
            env::set_var(ENV_READINESS_CEILING_MS, "not-a-number");
            env::set_var(ENV_SIZE_SYNC_MS, "1000");
        }
        let config = PlayerConfig::from_env();
        assert_eq!(config.readiness_poll_interval, Duration::from_millis(20));
        assert_eq!(config.readiness_ceiling, Duration::from_secs(10));
        assert_eq!(config.render_host.size_sync_interval, Duration::from_secs(1));
        assert_eq!(config.render_host.default_size, Size::new(640, 360));

        unsafe {
            for (var, value) in saved {
                match value {
                    Some(value) => env::set_var(var, value),
                    None => env::remove_var(var),
                }
            }
        }
    }
}
