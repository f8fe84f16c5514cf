use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use uuid::Uuid;

use super::StoreError;

/// Metadata linking a stored image blob to its laptop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub laptop_id: String,
    pub image_type: String,
    pub path: PathBuf,
}

/// Storage for uploaded laptop images.
pub trait ImageStore: Send + Sync {
    /// Persist `data` under a freshly generated id and return that id.
    fn save(&self, laptop_id: &str, image_type: &str, data: &[u8]) -> Result<String, StoreError>;

    /// Metadata for a previously saved image.
    fn find(&self, image_id: &str) -> Result<Option<ImageInfo>, StoreError>;
}

/// Writes each image to `<folder>/<uuid><image_type>`.
///
/// Metadata lives only in memory, so a restart loses the image to laptop
/// linkage while the files stay on disk. Every save targets a new random
/// name, so concurrent saves never share a file; only the metadata map is
/// locked.
pub struct DiskImageStore {
    image_folder: PathBuf,
    images: RwLock<HashMap<String, ImageInfo>>,
}

impl DiskImageStore {
    pub fn new(image_folder: impl Into<PathBuf>) -> Self {
        Self {
            image_folder: image_folder.into(),
            images: RwLock::new(HashMap::new()),
        }
    }
}

impl ImageStore for DiskImageStore {
    fn save(&self, laptop_id: &str, image_type: &str, data: &[u8]) -> Result<String, StoreError> {
        let image_id = Uuid::new_v4().to_string();
        let path = self.image_folder.join(format!("{image_id}{image_type}"));

        // A failure after create leaves a partial file behind; nothing
        // cleans it up.
        write_file(&self.image_folder, &path, data).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let mut images = self
            .images
            .write()
            .map_err(|_| StoreError::LockPoisoned("image save"))?;
        images.insert(
            image_id.clone(),
            ImageInfo {
                laptop_id: laptop_id.to_string(),
                image_type: image_type.to_string(),
                path,
            },
        );

        tracing::debug!(image_id = %image_id, laptop_id, bytes = data.len(), "stored image");
        Ok(image_id)
    }

    fn find(&self, image_id: &str) -> Result<Option<ImageInfo>, StoreError> {
        let images = self
            .images
            .read()
            .map_err(|_| StoreError::LockPoisoned("image find"))?;
        Ok(images.get(image_id).cloned())
    }
}

fn write_file(folder: &Path, path: &Path, data: &[u8]) -> std::io::Result<()> {
    fs::create_dir_all(folder)?;
    let mut file = fs::File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}
