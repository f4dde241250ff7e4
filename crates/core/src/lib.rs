pub mod domain;
pub mod job;
pub mod storage;
pub mod store;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;

    pub const DEFAULT_DATABASE_URL: &str =
        "https://lab2-dd3c8-default-rtdb.europe-west1.firebasedatabase.app";
    pub const DEFAULT_BASE_PATH: &str = "metals_data";
    pub const DEFAULT_CREDENTIALS_PATH: &str = "firebase_key.json";
    pub const DEFAULT_RAW_DATA_ROOT: &str = "raw";
    pub const DEFAULT_PORT: u16 = 8081;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub port: u16,
        pub raw_data_root: PathBuf,
        pub firebase_database_url: String,
        pub firebase_base_path: String,
        pub firebase_credentials_json: Option<String>,
        pub firebase_credentials_path: PathBuf,
        pub firebase_timeout_secs: Option<u64>,
        pub firebase_retries: Option<u32>,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                port: parse_env("PORT")?.unwrap_or(DEFAULT_PORT),
                raw_data_root: std::env::var("RAW_DATA_ROOT")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_RAW_DATA_ROOT.to_string())
                    .into(),
                firebase_database_url: std::env::var("FIREBASE_DATABASE_URL")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
                firebase_base_path: std::env::var("FIREBASE_BASE_PATH")
                    .unwrap_or_else(|_| DEFAULT_BASE_PATH.to_string()),
                firebase_credentials_json: std::env::var("FIREBASE_CREDENTIALS_JSON")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                firebase_credentials_path: std::env::var("FIREBASE_CREDENTIALS_PATH")
                    .unwrap_or_else(|_| DEFAULT_CREDENTIALS_PATH.to_string())
                    .into(),
                firebase_timeout_secs: parse_env("FIREBASE_TIMEOUT_SECS")?,
                firebase_retries: parse_env("FIREBASE_RETRIES")?,
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
            })
        }
    }

    fn parse_env<T>(key: &str) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match std::env::var(key) {
            Ok(s) if !s.trim().is_empty() => {
                let v = s
                    .trim()
                    .parse::<T>()
                    .with_context(|| format!("{key} must be a number (got {s:?})"))?;
                Ok(Some(v))
            }
            _ => Ok(None),
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn numeric_env_values_are_parsed_or_rejected() {
            std::env::set_var("METALS_CONFIG_TEST_GOOD", " 9090 ");
            std::env::set_var("METALS_CONFIG_TEST_BAD", "eighty");
            std::env::set_var("METALS_CONFIG_TEST_BLANK", "  ");

            assert_eq!(parse_env::<u16>("METALS_CONFIG_TEST_GOOD").unwrap(), Some(9090));
            assert_eq!(parse_env::<u16>("METALS_CONFIG_TEST_BLANK").unwrap(), None);
            assert_eq!(parse_env::<u16>("METALS_CONFIG_TEST_UNSET").unwrap(), None);

            let err = parse_env::<u16>("METALS_CONFIG_TEST_BAD").unwrap_err();
            assert!(format!("{err:#}").contains("METALS_CONFIG_TEST_BAD must be a number"));
        }
    }
}
