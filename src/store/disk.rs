//! Cache storage persisted under a directory with `tokio::fs`.
//!
//! Layout: one sub-directory per store, one file per entry. Entry files are
//! named by the URL-safe base64 SHA-256 of the key, so arbitrary URLs map to
//! safe file names. An entry file is a single JSON header line (key, url,
//! status, headers) followed by the raw body, so listing keys only reads the
//! header.

use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{CacheStorage, CacheStore};
use crate::error::{Error, Result};
use crate::request::CachedResponse;

const ENTRY_EXTENSION: &str = "entry";

/// Header line of one entry file.
#[derive(Debug, Serialize, Deserialize)]
struct EntryHeader {
    key: String,
    url: String,
    status: u16,
    headers: BTreeMap<String, String>,
}

impl EntryHeader {
    fn new(key: &str, response: &CachedResponse) -> Self {
        Self {
            key: key.to_string(),
            url: response.url.clone(),
            status: response.status,
            headers: response.headers.clone(),
        }
    }

    fn into_response(self, body: Bytes) -> CachedResponse {
        CachedResponse {
            url: self.url,
            status: self.status,
            headers: self.headers,
            body,
        }
    }
}

/// Cache storage rooted at a directory.
#[derive(Debug, Clone)]
pub struct DiskCacheStorage {
    root: PathBuf,
}

impl DiskCacheStorage {
    /// Creates storage rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn store_dir(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\']);
        if !valid {
            return Err(Error::store(name, "invalid store name"));
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    type Store = DiskCache;

    async fn open(&self, name: &str) -> Result<DiskCache> {
        let dir = self.store_dir(name)?;
        tokio::fs::create_dir_all(&dir).await?;
        Ok(DiskCache {
            name: name.to_string(),
            dir,
        })
    }

    async fn has(&self, name: &str) -> Result<bool> {
        let dir = self.store_dir(name)?;
        Ok(tokio::fs::metadata(&dir).await.is_ok_and(|m| m.is_dir()))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let dir = self.store_dir(name)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Handle to one on-disk store.
#[derive(Debug, Clone)]
pub struct DiskCache {
    name: String,
    dir: PathBuf,
}

impl DiskCache {
    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir
            .join(format!("{}.{ENTRY_EXTENSION}", URL_SAFE_NO_PAD.encode(digest)))
    }

    fn corrupt(&self, path: &Path, detail: impl std::fmt::Display) -> Error {
        Error::store(&self.name, format!("corrupt entry {}: {detail}", path.display()))
    }

    fn parse_header(&self, path: &Path, line: &[u8]) -> Result<EntryHeader> {
        serde_json::from_slice(line).map_err(|e| self.corrupt(path, e))
    }

    /// Reads a whole entry, or `None` if the file does not exist.
    async fn read_entry(&self, path: &Path) -> Result<Option<(EntryHeader, Bytes)>> {
        let contents = match tokio::fs::read(path).await {
            Ok(contents) => Bytes::from(contents),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let split = contents
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| self.corrupt(path, "missing header line"))?;
        let header = self.parse_header(path, &contents[..split])?;
        Ok(Some((header, contents.slice(split + 1..))))
    }

    /// Reads only the header line of an entry.
    async fn read_header(&self, path: &Path) -> Result<Option<EntryHeader>> {
        let file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut line = Vec::new();
        BufReader::new(file).read_until(b'\n', &mut line).await?;
        if line.pop() != Some(b'\n') {
            return Err(self.corrupt(path, "missing header line"));
        }
        self.parse_header(path, &line).map(Some)
    }
}

#[async_trait]
impl CacheStore for DiskCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<CachedResponse>> {
        match self.read_entry(&self.entry_path(key)).await? {
            // A digest collision would surface as a key mismatch.
            Some((header, body)) if header.key == key => Ok(Some(header.into_response(body))),
            _ => Ok(None),
        }
    }

    /// Writes to a uniquely named temporary file and renames it into place,
    /// so concurrent writes of one key never share a temporary path.
    async fn put(&self, key: &str, response: CachedResponse) -> Result<()> {
        let path = self.entry_path(key);
        let mut contents = serde_json::to_vec(&EntryHeader::new(key, &response))?;
        contents.push(b'\n');
        contents.extend_from_slice(&response.body);

        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&contents)?;
            tmp.persist(&path).map_err(|e| Error::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| Error::store(&self.name, format!("write task failed: {e}")))?
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut read_dir = tokio::fs::read_dir(&self.dir).await?;
        let mut keys = Vec::new();
        while let Some(dir_entry) = read_dir.next_entry().await? {
            let path = dir_entry.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION)
                && let Some(header) = self.read_header(&path).await?
            {
                keys.push(header.key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
