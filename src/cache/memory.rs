//! In-process cache storage, used for `--ephemeral` runs and tests.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::key::request_key;
use super::traits::{CacheEntryInfo, CacheStorage, CachedResponse, VaryKey};
use crate::http::{Request, Response};

struct MemoryEntry {
  url: String,
  vary: VaryKey,
  cached: CachedResponse,
}

/// Storage that keeps every named store in memory for the life of the process.
#[derive(Default)]
pub struct MemoryStorage {
  // Vec keeps creation order, like `caches.keys()`
  stores: Mutex<Vec<(String, BTreeMap<String, MemoryEntry>)>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<MutexGuard<'_, Vec<(String, BTreeMap<String, MemoryEntry>)>>> {
    self.stores.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl CacheStorage for MemoryStorage {
  fn open(&self, name: &str) -> Result<()> {
    let mut stores = self.lock()?;
    if !stores.iter().any(|(n, _)| n == name) {
      stores.push((name.to_string(), BTreeMap::new()));
    }
    Ok(())
  }

  fn has(&self, name: &str) -> Result<bool> {
    Ok(self.lock()?.iter().any(|(n, _)| n == name))
  }

  fn keys(&self) -> Result<Vec<String>> {
    Ok(self.lock()?.iter().map(|(n, _)| n.clone()).collect())
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let mut stores = self.lock()?;
    let before = stores.len();
    stores.retain(|(n, _)| n != name);
    Ok(stores.len() != before)
  }

  fn put(&self, name: &str, request: &Request, response: &Response) -> Result<()> {
    if request.method != reqwest::Method::GET {
      return Err(eyre!(
        "Refusing to cache {} {}: only GET requests can be stored",
        request.method,
        request.url
      ));
    }

    self.open(name)?;
    let mut stores = self.lock()?;
    if let Some((_, entries)) = stores.iter_mut().find(|(n, _)| n == name) {
      entries.insert(
        request_key(request),
        MemoryEntry {
          url: request.url.to_string(),
          vary: VaryKey::capture(request, response),
          cached: CachedResponse {
            response: response.clone(),
            cached_at: Utc::now(),
          },
        },
      );
    }
    Ok(())
  }

  fn match_in(&self, name: &str, request: &Request) -> Result<Option<CachedResponse>> {
    if request.method != reqwest::Method::GET {
      return Ok(None);
    }

    let key = request_key(request);
    let stores = self.lock()?;
    Ok(
      stores
        .iter()
        .find(|(n, _)| n == name)
        .and_then(|(_, entries)| entries.get(&key))
        .filter(|entry| entry.vary.matches(request))
        .map(|entry| entry.cached.clone()),
    )
  }

  fn entries(&self, name: &str) -> Result<Vec<CacheEntryInfo>> {
    let stores = self.lock()?;
    let mut entries: Vec<CacheEntryInfo> = stores
      .iter()
      .find(|(n, _)| n == name)
      .map(|(_, entries)| {
        entries
          .values()
          .map(|entry| CacheEntryInfo {
            url: entry.url.clone(),
            status: entry.cached.response.status,
            size: entry.cached.response.body.len(),
            cached_at: entry.cached.cached_at,
          })
          .collect()
      })
      .unwrap_or_default();
    entries.sort_by(|a, b| a.url.cmp(&b.url));
    Ok(entries)
  }
}
