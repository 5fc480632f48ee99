use crate::detector::SCRFD_MODEL_FILE;
use crate::engine::DEFAULT_THRESHOLD;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Shared configuration for the daemon and the CLI.
///
/// Resolution order: built-in defaults, then the TOML file named by
/// `VIGIL_CONFIG` (if set), then `VIGIL_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory of reference images, one `<name>.jpg` per identity.
    pub faces_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Similarity a probe must strictly exceed to be admitted.
    pub similarity_threshold: f32,
    /// Listen address of the admin web service.
    pub admin_bind: String,
    /// Confirmation token for destructive admin operations. Unset disables them.
    pub admin_secret: Option<String>,
    /// Static dashboard document served at `/`.
    pub dashboard_path: PathBuf,
    /// Where probe images are kept as evidence. Unset disables evidence capture.
    pub evidence_dir: Option<PathBuf>,
    /// V4L2 device path for live capture.
    pub camera_device: String,
    /// Frames discarded before a capture (camera AGC/AE stabilization).
    pub warmup_frames: usize,
}

/// On-disk shape of the optional TOML file; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    faces_dir: Option<PathBuf>,
    db_path: Option<PathBuf>,
    model_dir: Option<PathBuf>,
    similarity_threshold: Option<f32>,
    admin_bind: Option<String>,
    admin_secret: Option<String>,
    dashboard_path: Option<PathBuf>,
    evidence_dir: Option<PathBuf>,
    camera_device: Option<String>,
    warmup_frames: Option<usize>,
}

impl Config {
    /// Defaults rooted at `data_dir`.
    pub fn defaults(data_dir: &Path) -> Self {
        Self {
            faces_dir: data_dir.join("usuarios_autorizados"),
            db_path: data_dir.join("vigil.db"),
            model_dir: data_dir.join("models"),
            similarity_threshold: DEFAULT_THRESHOLD,
            admin_bind: "127.0.0.1:8000".to_string(),
            admin_secret: None,
            dashboard_path: PathBuf::from("web_admin/index.html"),
            evidence_dir: Some(data_dir.join("evidence")),
            camera_device: "/dev/video0".to_string(),
            warmup_frames: 4,
        }
    }

    /// Load configuration from defaults, `VIGIL_CONFIG` and `VIGIL_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("vigil");

        let mut config = Self::defaults(&data_dir);
        if let Ok(path) = std::env::var("VIGIL_CONFIG") {
            config.apply_file(Path::new(&path))?;
        }
        config.apply_env();
        Ok(config)
    }

    /// Overlay values from a TOML file.
    pub fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FileConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        macro_rules! overlay {
            ($($field:ident),*) => {
                $(if let Some(v) = file.$field { self.$field = v; })*
            };
        }
        overlay!(
            faces_dir,
            db_path,
            model_dir,
            similarity_threshold,
            admin_bind,
            dashboard_path,
            camera_device,
            warmup_frames
        );
        if file.admin_secret.is_some() {
            self.admin_secret = file.admin_secret;
        }
        if file.evidence_dir.is_some() {
            self.evidence_dir = file.evidence_dir;
        }
        tracing::debug!(path = %path.display(), "applied config file");
        Ok(())
    }

    /// Overlay values from `VIGIL_*` environment variables.
    pub fn apply_env(&mut self) {
        if let Some(v) = env_path("VIGIL_FACES_DIR") {
            self.faces_dir = v;
        }
        if let Some(v) = env_path("VIGIL_DB_PATH") {
            self.db_path = v;
        }
        if let Some(v) = env_path("VIGIL_MODEL_DIR") {
            self.model_dir = v;
        }
        self.similarity_threshold = env_f32("VIGIL_SIMILARITY_THRESHOLD", self.similarity_threshold);
        if let Ok(v) = std::env::var("VIGIL_ADMIN_BIND") {
            self.admin_bind = v;
        }
        if let Ok(v) = std::env::var("VIGIL_ADMIN_SECRET") {
            self.admin_secret = Some(v);
        }
        if let Some(v) = env_path("VIGIL_DASHBOARD_PATH") {
            self.dashboard_path = v;
        }
        if let Ok(v) = std::env::var("VIGIL_EVIDENCE_DIR") {
            // Empty value turns evidence capture off.
            self.evidence_dir = if v.is_empty() { None } else { Some(PathBuf::from(v)) };
        }
        if let Ok(v) = std::env::var("VIGIL_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        self.warmup_frames = env_usize("VIGIL_WARMUP_FRAMES", self.warmup_frames);
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join(SCRFD_MODEL_FILE)
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().filter(|v| !v.is_empty()).map(PathBuf::from)
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::defaults(Path::new("/var/lib/vigil"));
        assert_eq!(config.similarity_threshold, 0.6);
        assert_eq!(config.faces_dir, PathBuf::from("/var/lib/vigil/usuarios_autorizados"));
        assert_eq!(config.admin_bind, "127.0.0.1:8000");
        assert!(config.admin_secret.is_none());
        assert_eq!(config.detector_model_path(), PathBuf::from("/var/lib/vigil/models/det_10g.onnx"));
    }

    #[test]
    fn test_apply_file_overlays_present_keys() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vigil.toml");
        std::fs::write(
            &path,
            "similarity_threshold = 0.75\nadmin_secret = \"s3cret\"\nadmin_bind = \"0.0.0.0:9000\"\n",
        )
        .unwrap();

        let mut config = Config::defaults(tmp.path());
        config.apply_file(&path).unwrap();

        assert_eq!(config.similarity_threshold, 0.75);
        assert_eq!(config.admin_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.admin_bind, "0.0.0.0:9000");
        assert_eq!(config.faces_dir, tmp.path().join("usuarios_autorizados"));
    }

    #[test]
    fn test_apply_file_rejects_unknown_keys() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vigil.toml");
        std::fs::write(&path, "similarity = 0.5\n").unwrap();

        let mut config = Config::defaults(tmp.path());
        assert!(matches!(config.apply_file(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_apply_file_missing() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::defaults(tmp.path());
        assert!(matches!(
            config.apply_file(&tmp.path().join("absent.toml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
