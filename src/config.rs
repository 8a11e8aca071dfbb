use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use tracing::{info, warn};

pub struct Config {
    pub port: u16,
    pub events_file: String,
    pub cloud_name: String,
    pub cloud_api_key: String,
    pub cloud_api_secret: String,
    /// Lowercase hex SHA-256 digest of the admin password.
    pub admin_password_hash: String,
    pub secure_cookies: bool,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("RUST_PORT", "3000"),
            events_file: try_load("EVENTS_FILE", "data/events.json"),
            cloud_name: require("CLOUDINARY_CLOUD_NAME"),
            cloud_api_key: require("CLOUDINARY_API_KEY"),
            cloud_api_secret: read_secret("CLOUDINARY_API_SECRET"),
            admin_password_hash: read_secret("ADMIN_PASSWORD_HASH"),
            secure_cookies: try_load("SECURE_COOKIES", "false"),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}

fn require(key: &str) -> String {
    var(key).expect("Environment misconfigured!")
}

fn read_secret(secret_name: &str) -> String {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            warn!("Failed to read {secret_name} from file: {e}");
        })
        .expect("Secrets misconfigured!")
}
