//! Keyed storage for fetched and derived assets.
//!
//! Sector tiles and the base map never change, so they are reused whenever
//! present. Avatars are re-rendered only when the owner's badge descriptor
//! differs from the one recorded on the previous run.
//!
//! Disk layout under the cache root:
//! `{shard}/room/{sector}.png`, `{shard}/background.png`,
//! `{shard}/background_x{zoom}.png`, `avatar/{username}.png`,
//! `avatar/shard{shard}_player_setting.json`.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use image::RgbaImage;
use tracing::{info, warn};

use crate::coords::CellName;
use crate::error::MapError;
use crate::overlay::AvatarLookup;

/// Plain keyed byte storage. Single writer, no expiry.
pub trait Cache {
    fn has(&self, key: &str) -> bool;
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, MapError>;
    fn put(&self, key: &str, value: &[u8]) -> Result<(), MapError>;
}

impl<C: Cache + ?Sized> Cache for &C {
    fn has(&self, key: &str) -> bool {
        (**self).has(key)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, MapError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), MapError> {
        (**self).put(key, value)
    }
}

/// Cache backed by files under a root directory, one file per key.
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl Cache for DiskCache {
    fn has(&self, key: &str) -> bool {
        self.path(key).is_file()
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, MapError> {
        let path = self.path(key);
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), MapError> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("part");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// In-process cache, mostly for tests and dry runs.
#[derive(Default)]
pub struct MemoryCache {
    entries: RefCell<HashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl Cache for MemoryCache {
    fn has(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, MapError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), MapError> {
        self.entries.borrow_mut().insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

pub fn tile_key(shard: u32, sector: &CellName) -> String {
    format!("{}/room/{}.png", shard, sector)
}

pub fn native_map_key(shard: u32) -> String {
    format!("{}/background.png", shard)
}

pub fn magnified_map_key(shard: u32, zoom: u32) -> String {
    format!("{}/background_x{}.png", shard, zoom)
}

pub fn avatar_key(username: &str) -> String {
    format!("avatar/{}.png", username)
}

pub fn badge_settings_key(shard: u32) -> String {
    format!("avatar/shard{}_player_setting.json", shard)
}

/// Return the cached value for `key`, or fetch, store and return it.
pub fn cached_or_fetch<C, F>(cache: &C, key: &str, fetch: F) -> Result<Vec<u8>, MapError>
where
    C: Cache + ?Sized,
    F: FnOnce() -> Result<Vec<u8>, MapError>,
{
    if let Some(bytes) = cache.get(key)? {
        return Ok(bytes);
    }
    let bytes = fetch()?;
    cache.put(key, &bytes)?;
    Ok(bytes)
}

/// Outcome of an avatar refresh pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefreshStats {
    pub reused: usize,
    pub rendered: usize,
    pub failed: usize,
}

/// Rendered avatars keyed by username, with descriptor-based invalidation.
pub struct AvatarStore<C> {
    cache: C,
    shard: u32,
}

impl<C: Cache> AvatarStore<C> {
    pub fn new(cache: C, shard: u32) -> Self {
        Self { cache, shard }
    }

    /// Descriptors recorded by the previous refresh. Unreadable records
    /// count as empty, which only forces a re-render.
    pub fn load_descriptors(&self) -> Result<BTreeMap<String, String>, MapError> {
        let Some(bytes) = self.cache.get(&badge_settings_key(self.shard))? else {
            return Ok(BTreeMap::new());
        };
        match serde_json::from_slice(&bytes) {
            Ok(map) => Ok(map),
            Err(e) => {
                warn!(error = %e, "badge settings unreadable, re-rendering every avatar");
                Ok(BTreeMap::new())
            }
        }
    }

    /// True when the avatar is absent or its descriptor changed.
    pub fn is_stale(&self, username: &str, descriptor: &str, previous: &BTreeMap<String, String>) -> bool {
        !self.cache.has(&avatar_key(username)) || previous.get(username).map(String::as_str) != Some(descriptor)
    }

    /// Re-render every stale avatar and record the descriptors.
    ///
    /// `render` produces the PNG bytes for one user. A failure there is
    /// logged and skipped; that user keeps the previous descriptor record so
    /// the next run tries again.
    pub fn refresh<F>(&self, badges: &BTreeMap<String, String>, mut render: F) -> Result<RefreshStats, MapError>
    where
        F: FnMut(&str) -> Result<Vec<u8>, MapError>,
    {
        let previous = self.load_descriptors()?;
        let mut recorded = BTreeMap::new();
        let mut stats = RefreshStats::default();

        for (i, (username, descriptor)) in badges.iter().enumerate() {
            if !self.is_stale(username, descriptor, &previous) {
                stats.reused += 1;
                recorded.insert(username.clone(), descriptor.clone());
                continue;
            }

            match render(username) {
                Ok(png) => {
                    self.cache.put(&avatar_key(username), &png)?;
                    recorded.insert(username.clone(), descriptor.clone());
                    stats.rendered += 1;
                }
                Err(e) => {
                    warn!(%username, error = %e, "avatar refresh failed");
                    if let Some(old) = previous.get(username) {
                        recorded.insert(username.clone(), old.clone());
                    }
                    stats.failed += 1;
                }
            }

            if (i + 1) % 100 == 0 {
                info!(done = i + 1, total = badges.len(), "refreshing avatars");
            }
        }

        self.cache.put(&badge_settings_key(self.shard), &serde_json::to_vec(&recorded)?)?;
        info!(reused = stats.reused, rendered = stats.rendered, failed = stats.failed, "avatars ready");
        Ok(stats)
    }
}

impl<C: Cache> AvatarLookup for AvatarStore<C> {
    fn avatar(&self, username: &str) -> Result<RgbaImage, MapError> {
        let bytes = self
            .cache
            .get(&avatar_key(username))?
            .ok_or_else(|| MapError::AvatarMissing(username.to_string()))?;
        image::load_from_memory(&bytes)
            .map(|img| img.to_rgba8())
            .map_err(|source| MapError::AvatarDecode { username: username.to_string(), source })
    }
}
