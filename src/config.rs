use std::{path::PathBuf, str::FromStr};

use anyhow::{ensure, Context, Result};
use chrono::TimeDelta;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    /// Directory for the persisted session fallback. `None` keeps it in memory.
    pub session_store_dir: Option<PathBuf>,
    /// A sensor silent for this long is reported inactive.
    pub freshness_window: TimeDelta,
    /// Default length of "recent" lists and charts.
    pub recent_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_owned(),
            server_port: 8080,
            session_store_dir: None,
            freshness_window: TimeDelta::hours(24),
            recent_limit: 5,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let optional = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        let freshness_secs: i64 = parse(&optional("FRESHNESS_WINDOW_SECS", "86400"))
            .context("FRESHNESS_WINDOW_SECS must be a positive integer")?;
        ensure!(freshness_secs > 0, "FRESHNESS_WINDOW_SECS must be a positive integer");

        let recent_limit: usize = parse(&optional("RECENT_LIMIT", "5"))
            .context("RECENT_LIMIT must be a positive integer")?;
        ensure!(recent_limit > 0, "RECENT_LIMIT must be a positive integer");

        Ok(Self {
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: parse(&optional("SERVER_PORT", "8080"))
                .context("SERVER_PORT must be a valid port number")?,
            session_store_dir: lookup("SESSION_STORE_DIR")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            freshness_window: TimeDelta::try_seconds(freshness_secs)
                .context("FRESHNESS_WINDOW_SECS is out of range")?,
            recent_limit,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn parse<T>(raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(raw.trim().parse::<T>()?)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_set() {
        let c = config_from(&[]).unwrap();
        assert_eq!(c.server_host, "0.0.0.0");
        assert_eq!(c.server_port, 8080);
        assert_eq!(c.session_store_dir, None);
        assert_eq!(c.freshness_window, TimeDelta::hours(24));
        assert_eq!(c.recent_limit, 5);
        assert_eq!(c.bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn overrides_are_applied() {
        let c = config_from(&[
            ("SERVER_HOST", "127.0.0.1"),
            ("SERVER_PORT", "3000"),
            ("SESSION_STORE_DIR", "/var/lib/dashboard"),
            ("FRESHNESS_WINDOW_SECS", "3600"),
            ("RECENT_LIMIT", "10"),
        ])
        .unwrap();
        assert_eq!(c.bind_address(), "127.0.0.1:3000");
        assert_eq!(c.session_store_dir, Some(PathBuf::from("/var/lib/dashboard")));
        assert_eq!(c.freshness_window, TimeDelta::hours(1));
        assert_eq!(c.recent_limit, 10);
    }

    #[test]
    fn blank_store_dir_means_memory() {
        let c = config_from(&[("SESSION_STORE_DIR", "  ")]).unwrap();
        assert_eq!(c.session_store_dir, None);
    }

    #[test]
    fn invalid_port_errors() {
        let err = config_from(&[("SERVER_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("SERVER_PORT"));
    }

    #[test]
    fn zero_window_errors() {
        let err = config_from(&[("FRESHNESS_WINDOW_SECS", "0")]).unwrap_err();
        assert!(err.to_string().contains("FRESHNESS_WINDOW_SECS"));

        let err = config_from(&[("FRESHNESS_WINDOW_SECS", "-5")]).unwrap_err();
        assert!(err.to_string().contains("FRESHNESS_WINDOW_SECS"));
    }

    #[test]
    fn zero_recent_limit_errors() {
        let err = config_from(&[("RECENT_LIMIT", "0")]).unwrap_err();
        assert!(err.to_string().contains("RECENT_LIMIT"));
    }
}
