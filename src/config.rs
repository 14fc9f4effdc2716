use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{anyhow, Context};

/// When the viewer's admin flag becomes known after sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminFlagPolicy {
    /// Read the profile back during sign-in and cache the flag in the session.
    Await,
    /// Skip the read-back; admin checks read the profile when they need it.
    Lazy,
}

impl FromStr for AdminFlagPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "await" => Ok(Self::Await),
            "lazy" => Ok(Self::Lazy),
            other => Err(anyhow!("unknown admin flag policy {other:?}, expected `await` or `lazy`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub bind_addr: SocketAddr,
    pub public_url: String,
    pub client_secret_path: PathBuf,
    pub identity_toolkit_url: String,
    pub blob_dir: PathBuf,
    pub admin_flag_policy: AdminFlagPolicy,
    pub typing_idle: Duration,
    pub session_idle_minutes: i64,
    pub cors_origin: Option<String>,
}

impl Config {
    /// Reads `.env` (if any) and then the process environment.
    pub fn from_env() -> anyhow::Result<Config> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
        fn parsed<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> anyhow::Result<T>
        where
            T: FromStr,
            T::Err: std::fmt::Display,
        {
            let raw = get(key).unwrap_or_else(|| default.to_owned());
            raw.parse::<T>()
                .map_err(|e| anyhow!("{e}"))
                .with_context(|| format!("invalid {key}={raw:?}"))
        }

        let string = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_owned());

        Ok(Config {
            database_url: string("DATABASE_URL", "sqlite://hushline.db"),
            database_max_connections: parsed(&get, "DATABASE_MAX_CONNECTIONS", "16")?,
            bind_addr: parsed(&get, "BIND_ADDR", "0.0.0.0:8080")?,
            public_url: string("PUBLIC_URL", "http://localhost:8080")
                .trim_end_matches('/')
                .to_owned(),
            client_secret_path: string("CLIENT_SECRET_PATH", "client_secret.json").into(),
            identity_toolkit_url: string("IDENTITY_TOOLKIT_URL", "https://identitytoolkit.googleapis.com/v1")
                .trim_end_matches('/')
                .to_owned(),
            blob_dir: string("BLOB_DIR", "blobs").into(),
            admin_flag_policy: parsed(&get, "ADMIN_FLAG_POLICY", "await")?,
            typing_idle: Duration::from_millis(parsed(&get, "TYPING_IDLE_MS", "1000")?),
            session_idle_minutes: parsed(&get, "SESSION_IDLE_MINUTES", "30")?,
            cors_origin: get("CORS_ORIGIN").filter(|s| !s.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.database_url, "sqlite://hushline.db");
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.admin_flag_policy, AdminFlagPolicy::Await);
        assert_eq!(config.typing_idle, Duration::from_secs(1));
        assert!(config.cors_origin.is_none());
    }

    #[test]
    fn overrides() {
        let config = Config::from_lookup(lookup(&[
            ("ADMIN_FLAG_POLICY", "Lazy"),
            ("TYPING_IDLE_MS", "250"),
            ("PUBLIC_URL", "https://chat.example.com/"),
        ]))
        .unwrap();
        assert_eq!(config.admin_flag_policy, AdminFlagPolicy::Lazy);
        assert_eq!(config.typing_idle, Duration::from_millis(250));
        assert_eq!(config.public_url, "https://chat.example.com");
    }

    #[test]
    fn rejects_garbage() {
        assert!(Config::from_lookup(lookup(&[("ADMIN_FLAG_POLICY", "sometimes")])).is_err());
        assert!(Config::from_lookup(lookup(&[("TYPING_IDLE_MS", "soon")])).is_err());
        assert!(Config::from_lookup(lookup(&[("BIND_ADDR", "nowhere")])).is_err());
    }
}
