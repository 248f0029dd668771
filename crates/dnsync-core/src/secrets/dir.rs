// # Directory Secret Store
//
// Reads secrets laid out as one file per key:
//
// ```text
// <root>/
//   default/
//     cf-token/
//       authToken
// ```
//
// Files are read on every lookup, so rotated credentials take effect on the
// next pass without a restart. Hidden entries (leading `.`) are skipped; this
// hides the `..data` symlinks of projected volumes.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use crate::Error;
use crate::traits::secret_store::{Secret, SecretStore};

/// Secret store backed by a directory tree
#[derive(Debug, Clone)]
pub struct DirSecretStore {
    root: PathBuf,
}

impl DirSecretStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn secret_dir(&self, name: &str, namespace: &str) -> Result<PathBuf, Error> {
        for part in [namespace, name] {
            if !is_plain_component(part) {
                return Err(Error::invalid_input(format!(
                    "invalid secret path component '{}'",
                    part
                )));
            }
        }
        Ok(self.root.join(namespace).join(name))
    }
}

/// A single normal path segment: no separators, no `.`/`..`
fn is_plain_component(part: &str) -> bool {
    let mut components = Path::new(part).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[async_trait]
impl SecretStore for DirSecretStore {
    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Option<Secret>, Error> {
        let dir = self.secret_dir(name, namespace)?;

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("Secret directory {} does not exist", dir.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(Error::store(format!(
                    "Failed to read secret directory {}: {}",
                    dir.display(),
                    e
                )));
            }
        };

        let mut secret = Secret::new();
        while let Some(entry) = entries.next_entry().await? {
            let key = entry.file_name().to_string_lossy().into_owned();
            if key.starts_with('.') {
                continue;
            }

            // Follows symlinks, so projected volume entries resolve to files
            let metadata = fs::metadata(entry.path()).await?;
            if !metadata.is_file() {
                continue;
            }

            let value = fs::read(entry.path()).await?;
            secret.insert(key, value);
        }

        Ok(Some(secret))
    }
}
