//! Writes uploaded audio into the content directory under generated names

use std::{
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
};

use log::{debug, warn};
use uuid::Uuid;

use crate::{domain::track::StoredFile, error::CatalogError, public_endpoint};

#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
    url_prefix: String,
    base_url: Option<String>,
}

impl BlobStore {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: &str, base_url: Option<String>) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.to_string(),
            base_url,
        }
    }

    #[cfg(test)]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copies `content` into a new file named `<uuid>.<ext of original_name>`.
    ///
    /// Returns the public reference and the number of bytes written.
    pub fn store<R: Read>(
        &self,
        mut content: R,
        original_name: &str,
    ) -> Result<StoredFile, CatalogError> {
        let file_name = generated_name(original_name)?;

        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(&file_name);

        let size = (|| -> io::Result<u64> {
            let mut file = File::create(&path)?;
            let size = io::copy(&mut content, &mut file)?;
            file.sync_all()?;
            Ok(size)
        })();

        let size = match size {
            Ok(size) => size,
            Err(e) => {
                // no half-written blobs left behind
                let _ = std::fs::remove_file(&path);
                return Err(CatalogError::Storage(e));
            }
        };

        debug!(
            "stored '{}' as {} ({} bytes)",
            original_name,
            path.to_string_lossy(),
            size
        );

        Ok(StoredFile {
            url: public_endpoint::asset_url(self.base_url.as_deref(), &self.url_prefix, &file_name),
            size,
        })
    }

    /// Deletes the blob behind `file`. Missing blobs are not an error.
    pub fn remove(&self, file: &StoredFile) -> Result<(), CatalogError> {
        let Some(path) = public_endpoint::file_name_from_url(&file.url, &self.url_prefix)
            .and_then(|name| self.resolve(name))
        else {
            warn!("refusing to remove blob with foreign reference {}", file.url);
            return Ok(());
        };

        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CatalogError::Storage(e)),
        }
    }

    /// Maps a served file name to its path inside the content directory.
    ///
    /// Names that could escape the directory resolve to `None`.
    pub fn resolve(&self, file_name: &str) -> Option<PathBuf> {
        safe_join(&self.dir, file_name)
    }
}

/// Joins a single file name onto `dir`, refusing anything that could leave it
pub fn safe_join(dir: &Path, file_name: &str) -> Option<PathBuf> {
    let safe = !file_name.is_empty()
        && !file_name.contains(['/', '\\'])
        && file_name != "."
        && file_name != "..";
    safe.then(|| dir.join(file_name))
}

/// `<uuid>.<ext>`, where ext is what follows the last `.` of the original name.
///
/// The extension ends up in a url path, so only ASCII letters and digits are accepted.
fn generated_name(original_name: &str) -> Result<String, CatalogError> {
    let ext = original_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .ok_or_else(|| CatalogError::InvalidName(original_name.to_string()))?;

    Ok(format!("{}.{}", Uuid::new_v4(), ext))
}
