use std::path::PathBuf;
use vigil_core::Config;

/// Settings the admin web service needs, shared with every handler.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Listen address (e.g. "127.0.0.1:8000"; port 0 picks a free port).
    pub bind: String,
    /// SQLite database; each request opens its own connection to it.
    pub db_path: PathBuf,
    /// Static dashboard document served at `/`.
    pub dashboard_path: PathBuf,
    /// Confirmation token for `/limpiar`. `None` rejects every cleanup.
    pub admin_secret: Option<String>,
}

impl AdminConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bind: config.admin_bind.clone(),
            db_path: config.db_path.clone(),
            dashboard_path: config.dashboard_path.clone(),
            admin_secret: config.admin_secret.clone(),
        }
    }

    /// Compare `candidate` with the configured secret without early exit.
    pub fn token_matches(&self, candidate: &str) -> bool {
        let Some(secret) = self.admin_secret.as_deref().filter(|s| !s.is_empty()) else {
            return false;
        };
        secret.len() == candidate.len()
            && secret
                .bytes()
                .zip(candidate.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}
