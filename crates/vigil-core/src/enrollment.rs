//! Enrolled identity catalog.
//!
//! Backed by a directory of reference images (`<name>.jpg`) and mirrored into
//! the persistent identity table through an [`IdentityMirror`]. Iteration
//! order is lexicographic by name so decisions are reproducible.

use crate::extractor::FeatureExtractor;
use crate::types::Identity;
use image::{DynamicImage, ImageFormat};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use thiserror::Error;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Error, Debug)]
#[error("identity mirror: {0}")]
pub struct MirrorError(pub String);

/// Persistent-side view of the identity catalog.
pub trait IdentityMirror: Send + Sync {
    /// Make sure an identity row exists for `name`. Returns whether it was created.
    fn ensure(&self, name: &str) -> Result<bool, MirrorError>;
    /// Remove the identity row for `name`, if any.
    fn forget(&self, name: &str) -> Result<(), MirrorError>;
}

/// Mirror that persists nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMirror;

impl IdentityMirror for NoMirror {
    fn ensure(&self, _name: &str) -> Result<bool, MirrorError> {
        Ok(false)
    }

    fn forget(&self, _name: &str) -> Result<(), MirrorError> {
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("invalid identity name: {0:?}")]
    InvalidName(String),
    #[error("no face detected in enrollment image")]
    NoFaceDetected,
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write reference image {}: {source}", path.display())]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Mirror(#[from] MirrorError),
}

/// Counts reported by [`EnrollmentStore::load`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: usize,
    pub skipped: usize,
}

/// Check that `name` can serve both as a catalog key and as a file stem.
pub fn validate_name(name: &str) -> Result<(), EnrollError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
        || name.trim() != name;
    if bad {
        return Err(EnrollError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Catalog of enrolled identities.
///
/// Readers take snapshots under the `identities` read lock. `load`, `enroll`
/// and `remove` hold `writer` for their whole duration, so a reload never
/// discards an enrollment that completed while it was reading the directory.
pub struct EnrollmentStore {
    dir: PathBuf,
    extractor: Arc<FeatureExtractor>,
    mirror: Arc<dyn IdentityMirror>,
    identities: RwLock<BTreeMap<String, Identity>>,
    writer: Mutex<()>,
}

impl EnrollmentStore {
    pub fn new(dir: impl Into<PathBuf>, extractor: Arc<FeatureExtractor>, mirror: Arc<dyn IdentityMirror>) -> Self {
        Self {
            dir: dir.into(),
            extractor,
            mirror,
            identities: RwLock::new(BTreeMap::new()),
            writer: Mutex::new(()),
        }
    }

    /// Canonical reference image path for `name`.
    pub fn reference_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.jpg"))
    }

    /// Rebuild the catalog from the reference image directory.
    ///
    /// Images that cannot be decoded or contain no detectable face are
    /// skipped. A missing directory is created and yields an empty catalog.
    /// When a name has several images, `<name>.jpg` wins.
    pub fn load(&self) -> Result<LoadSummary, EnrollError> {
        let _writer = self.lock_writer();
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).map_err(|source| EnrollError::Io {
                path: self.dir.clone(),
                source,
            })?;
            tracing::info!(dir = %self.dir.display(), "created reference image directory");
            self.swap(BTreeMap::new());
            return Ok(LoadSummary::default());
        }

        let entries = fs::read_dir(&self.dir).map_err(|source| EnrollError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_image_file(path))
            .collect();
        paths.sort();

        let mut catalog = BTreeMap::new();
        let mut summary = LoadSummary::default();

        let mut by_name: BTreeMap<String, PathBuf> = BTreeMap::new();
        for path in paths {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                summary.skipped += 1;
                continue;
            };
            if validate_name(&name).is_err() {
                tracing::warn!(path = %path.display(), "skipping reference image with unusable name");
                summary.skipped += 1;
                continue;
            }
            if let Some(kept) = by_name.get(&name) {
                let (ignored, keep_existing) = if path == self.reference_path(&name) {
                    (kept.clone(), false)
                } else {
                    (path.clone(), true)
                };
                tracing::warn!(name = %name, path = %ignored.display(), "ignoring duplicate reference image");
                if keep_existing {
                    continue;
                }
            }
            by_name.insert(name, path);
        }

        for (name, path) in by_name {
            let image = match image::open(&path) {
                Ok(image) => image,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable reference image");
                    summary.skipped += 1;
                    continue;
                }
            };
            let Some(features) = self.extractor.extract(&image) else {
                tracing::warn!(name = %name, path = %path.display(), "no face in reference image; skipped");
                summary.skipped += 1;
                continue;
            };

            if let Err(e) = self.mirror.ensure(&name) {
                tracing::warn!(name = %name, error = %e, "failed to mirror identity");
            }

            tracing::debug!(name = %name, "loaded identity");
            catalog.insert(
                name.clone(),
                Identity {
                    name,
                    features,
                    source_image: path,
                },
            );
            summary.loaded += 1;
        }

        self.swap(catalog);
        tracing::info!(loaded = summary.loaded, skipped = summary.skipped, "enrollment catalog loaded");
        Ok(summary)
    }

    /// Enroll (or re-enroll) `name` from `image`.
    ///
    /// Nothing is modified unless a face is found and the reference image and
    /// mirror row are both written.
    pub fn enroll(&self, name: &str, image: &DynamicImage) -> Result<Identity, EnrollError> {
        validate_name(name)?;
        let features = self.extractor.extract(image).ok_or(EnrollError::NoFaceDetected)?;

        let _writer = self.lock_writer();
        fs::create_dir_all(&self.dir).map_err(|source| EnrollError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let target = self.reference_path(name);
        let staging = self.dir.join(format!(".{name}.jpg.partial"));
        image
            .to_rgb8()
            .save_with_format(&staging, ImageFormat::Jpeg)
            .map_err(|source| EnrollError::ImageWrite {
                path: staging.clone(),
                source,
            })?;

        let created = match self.mirror.ensure(name) {
            Ok(created) => created,
            Err(e) => {
                let _ = fs::remove_file(&staging);
                return Err(e.into());
            }
        };

        if let Err(source) = fs::rename(&staging, &target) {
            let _ = fs::remove_file(&staging);
            if created {
                if let Err(e) = self.mirror.forget(name) {
                    tracing::warn!(name, error = %e, "failed to roll back identity row");
                }
            }
            return Err(EnrollError::Io { path: target, source });
        }

        for stale in self.reference_files(name)? {
            if stale != target {
                fs::remove_file(&stale).map_err(|source| EnrollError::Io { path: stale.clone(), source })?;
                tracing::debug!(name, path = %stale.display(), "removed superseded reference image");
            }
        }

        let identity = Identity {
            name: name.to_string(),
            features,
            source_image: target,
        };
        self.write().insert(name.to_string(), identity.clone());
        tracing::info!(name, "identity enrolled");
        Ok(identity)
    }

    pub fn get(&self, name: &str) -> Option<Identity> {
        self.read().get(name).cloned()
    }

    /// All identities, ordered by name.
    pub fn list(&self) -> Vec<Identity> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Remove `name` from the catalog, every reference image and the mirror.
    ///
    /// Returns whether anything was removed: a catalog entry, a reference
    /// image, or both. Works on a catalog that was never loaded.
    pub fn remove(&self, name: &str) -> Result<bool, EnrollError> {
        let _writer = self.lock_writer();
        self.mirror.forget(name)?;

        let removed = self.write().remove(name);
        let mut file_removed = false;
        for path in self.reference_files(name)? {
            match fs::remove_file(&path) {
                Ok(()) => file_removed = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(EnrollError::Io { path, source }),
            }
        }

        let existed = removed.is_some() || file_removed;
        tracing::info!(name, existed, "identity removed");
        Ok(existed)
    }

    /// Every image in the directory whose stem is `name`, any supported extension.
    fn reference_files(&self, name: &str) -> Result<Vec<PathBuf>, EnrollError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(EnrollError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };
        Ok(entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_image_file(path) && path.file_stem().and_then(|s| s.to_str()) == Some(name))
            .collect())
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn swap(&self, catalog: BTreeMap<String, Identity>) {
        *self.write() = catalog;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Identity>> {
        self.identities.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, Identity>> {
        self.identities.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_image_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
}
