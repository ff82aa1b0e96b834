use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::traits::BinaryWriter;
use crate::types::BlobMetadata;

const META_SUFFIX: &str = ".meta.json";

/// Blobs on the local filesystem, each with a JSON metadata sidecar.
#[derive(Clone, Debug)]
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `path` under the root, rejecting anything that could escape it.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        if path.is_empty() {
            bail!("empty blob path");
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                _ => bail!("blob path {:?} escapes the store root", path),
            }
        }
        Ok(self.root.join(relative))
    }

    pub fn load_metadata(&self, path: &str) -> Result<Option<BlobMetadata>> {
        let target = self.resolve(path)?;
        let meta = sidecar(&target);
        match std::fs::read(&meta) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn sidecar(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(META_SUFFIX);
    PathBuf::from(name)
}

#[async_trait]
impl BinaryWriter for FileBlobStore {
    async fn write_binary(&self, path: &str, content: &[u8], metadata: &BlobMetadata) -> Result<()> {
        let target = self.resolve(path)?;
        if let Some(dir) = target.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir).await?;
            }
        }
        tokio::fs::write(&target, content).await?;
        let meta = serde_json::to_vec_pretty(metadata)?;
        tokio::fs::write(sidecar(&target), meta).await?;
        log::debug!("wrote blob {} ({} bytes)", target.display(), content.len());
        Ok(())
    }
}
