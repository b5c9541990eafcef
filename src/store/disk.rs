//! Cache store persisted on the local file system.
//!
//! Layout under the root directory:
//!
//! ```text
//! gen-<sha256(name)>/generation.toml            name, creation time, live snapshot
//! gen-<sha256(name)>/<snapshot>/<key>.toml      method, url, status, headers
//! gen-<sha256(name)>/<snapshot>/<key>.body      raw body
//! ```
//!
//! `add_all` writes a complete new snapshot directory (previous entries plus
//! the new ones) and switches to it by atomically replacing
//! `generation.toml`, so readers see either every new entry or none. A
//! deleted generation is renamed away before its files are removed. Readers
//! take no lock: a file that vanishes under them counts as a miss.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use super::CacheStorage;
use crate::error::{Error, Result};
use crate::request::{Request, Response};

const GENERATION_FILE: &str = "generation.toml";
const ENTRIES_DIR: &str = "entries";
const SNAPSHOT_PREFIX: &str = "entries-";
const GENERATION_PREFIX: &str = "gen-";

fn default_entries_dir() -> String {
    ENTRIES_DIR.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GenerationMeta {
    name: String,
    created: DateTime<Utc>,
    /// Directory (relative to the generation) holding the live entries.
    #[serde(default = "default_entries_dir")]
    entries: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    method: String,
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
}

fn digest(value: &str) -> String {
    format!("{:x}", Sha256::digest(value.as_bytes()))
}

/// Returns the sibling `.tmp` path used for atomic writes.
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Writes a file atomically (write tmp + rename).
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);
    let written = match tokio::fs::write(&tmp, contents).await {
        Ok(()) => tokio::fs::rename(&tmp, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Treats a file that disappeared as absent.
fn not_found_as_none<T>(result: std::io::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn corrupt(path: &Path, err: impl std::fmt::Display) -> Error {
    Error::Storage(format!("corrupt cache file {}: {err}", path.display()))
}

/// Cache store keeping one directory per generation.
pub struct DiskCacheStorage {
    root: PathBuf,
    /// Serializes open/add_all/delete; reads do not take it.
    write_lock: Mutex<()>,
}

impl DiskCacheStorage {
    /// Creates a store rooted at `root`. Directories are created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generation_dir(&self, name: &str) -> PathBuf {
        self.root
            .join(format!("{GENERATION_PREFIX}{}", &digest(name)[..32]))
    }

    /// Reads every generation's metadata, oldest first.
    async fn generations(&self) -> Result<Vec<(GenerationMeta, PathBuf)>> {
        let mut read_dir = match tokio::fs::read_dir(&self.root).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut generations = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let is_generation = entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(GENERATION_PREFIX));
            if !is_generation {
                continue;
            }
            let Some(meta) = Self::read_generation(&entry.path()).await? else {
                log::debug!("Skipping {} without metadata", entry.path().display());
                continue;
            };
            generations.push((meta, entry.path()));
        }

        generations.sort_by(|a, b| {
            a.0.created
                .cmp(&b.0.created)
                .then_with(|| a.0.name.cmp(&b.0.name))
        });
        Ok(generations)
    }

    /// Reads `generation.toml` of a generation directory, `None` if absent.
    async fn read_generation(dir: &Path) -> Result<Option<GenerationMeta>> {
        let meta_path = dir.join(GENERATION_FILE);
        let Some(contents) = not_found_as_none(tokio::fs::read_to_string(&meta_path).await)?
        else {
            return Ok(None);
        };
        toml::from_str(&contents)
            .map(Some)
            .map_err(|e| corrupt(&meta_path, e))
    }

    /// Creates the generation directory if needed. Caller holds `write_lock`.
    async fn open_locked(&self, name: &str) -> Result<(PathBuf, GenerationMeta)> {
        let dir = self.generation_dir(name);
        if let Some(meta) = Self::read_generation(&dir).await? {
            return Ok((dir, meta));
        }
        tokio::fs::create_dir_all(dir.join(ENTRIES_DIR)).await?;
        let meta = GenerationMeta {
            name: name.to_string(),
            created: Utc::now(),
            entries: default_entries_dir(),
        };
        write_atomic(&dir.join(GENERATION_FILE), toml::to_string(&meta)?.as_bytes()).await?;
        Ok((dir, meta))
    }

    /// Copies the live entries of a generation into a new snapshot.
    async fn copy_entries(live: &Path, snapshot: &Path) -> Result<()> {
        tokio::fs::create_dir_all(snapshot).await?;
        let Some(mut read_dir) = not_found_as_none(tokio::fs::read_dir(live).await)? else {
            return Ok(());
        };
        while let Some(entry) = read_dir.next_entry().await? {
            tokio::fs::copy(entry.path(), snapshot.join(entry.file_name())).await?;
        }
        Ok(())
    }

    async fn stage_entries(staging: &Path, entries: &[(Request, Response)]) -> Result<()> {
        for (request, response) in entries {
            let key = digest(&request.cache_key());
            let meta = EntryMeta {
                method: request.method().to_string(),
                url: request.url().to_string(),
                status: response.status(),
                headers: response.headers().to_vec(),
            };
            tokio::fs::write(staging.join(format!("{key}.body")), response.body()).await?;
            tokio::fs::write(
                staging.join(format!("{key}.toml")),
                toml::to_string(&meta)?,
            )
            .await?;
        }
        Ok(())
    }

    /// Builds `snapshot` from the live entries plus `entries`, then points
    /// `generation.toml` at it.
    async fn publish(
        dir: &Path,
        meta: &GenerationMeta,
        snapshot: &str,
        entries: &[(Request, Response)],
    ) -> Result<()> {
        let staging = dir.join(snapshot);
        Self::copy_entries(&dir.join(&meta.entries), &staging).await?;
        Self::stage_entries(&staging, entries).await?;
        let updated = GenerationMeta {
            entries: snapshot.to_string(),
            ..meta.clone()
        };
        write_atomic(&dir.join(GENERATION_FILE), toml::to_string(&updated)?.as_bytes()).await
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.open_locked(name).await.map(|_| ())
    }

    async fn add_all(&self, name: &str, entries: Vec<(Request, Response)>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let (dir, meta) = self.open_locked(name).await?;

        let snapshot = format!("{SNAPSHOT_PREFIX}{}", uuid::Uuid::new_v4());
        if let Err(e) = Self::publish(&dir, &meta, &snapshot, &entries).await {
            let _ = tokio::fs::remove_dir_all(dir.join(&snapshot)).await;
            return Err(e);
        }

        // The previous snapshot is unreferenced now. Readers still inside it
        // see a miss.
        if let Err(e) = tokio::fs::remove_dir_all(dir.join(&meta.entries)).await {
            log::warn!("Failed to remove stale snapshot of {name}: {e}");
        }
        Ok(())
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>> {
        if !request.is_get() {
            return Ok(None);
        }
        let key = digest(&request.cache_key());

        for (generation, dir) in self.generations().await? {
            let entries_dir = dir.join(&generation.entries);
            let meta_path = entries_dir.join(format!("{key}.toml"));
            let Some(contents) = not_found_as_none(tokio::fs::read_to_string(&meta_path).await)?
            else {
                continue;
            };
            let meta: EntryMeta = toml::from_str(&contents).map_err(|e| corrupt(&meta_path, e))?;
            if meta.method != request.method() || meta.url != request.url() {
                continue;
            }
            // Deleted or replaced since the metadata was read.
            let Some(body) =
                not_found_as_none(tokio::fs::read(entries_dir.join(format!("{key}.body"))).await)?
            else {
                log::debug!("{} vanished from {}", request.url(), generation.name);
                continue;
            };
            return Ok(Some(Response::new(meta.status, body).with_headers(meta.headers)));
        }
        Ok(None)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .generations()
            .await?
            .into_iter()
            .map(|(meta, _)| meta.name)
            .collect())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let dir = self.generation_dir(name);
        if tokio::fs::metadata(&dir).await.is_err() {
            return Ok(false);
        }
        let trash = self.root.join(format!(".trash-{}", uuid::Uuid::new_v4()));
        tokio::fs::rename(&dir, &trash).await?;
        tokio::fs::remove_dir_all(&trash).await?;
        Ok(true)
    }

    async fn requests(&self, name: &str) -> Result<Vec<Request>> {
        let dir = self.generation_dir(name);
        let Some(generation) = Self::read_generation(&dir).await? else {
            return Ok(Vec::new());
        };
        let entries_dir = dir.join(&generation.entries);
        let Some(mut read_dir) = not_found_as_none(tokio::fs::read_dir(&entries_dir).await)?
        else {
            return Ok(Vec::new());
        };

        let mut requests = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "toml") {
                continue;
            }
            let Some(contents) = not_found_as_none(tokio::fs::read_to_string(&path).await)?
            else {
                continue;
            };
            let meta: EntryMeta = toml::from_str(&contents).map_err(|e| corrupt(&path, e))?;
            requests.push(Request::new(&meta.method, &meta.url));
        }
        requests.sort_by(|a, b| a.url().cmp(b.url()));
        Ok(requests)
    }
}
