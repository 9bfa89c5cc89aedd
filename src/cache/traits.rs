//! Core traits and types for named cache stores.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde::{Deserialize, Serialize};

use crate::http::{Request, Response};

/// A response replayed from a cache store.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  /// The stored response, exactly as it was put
  pub response: Response,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

/// Summary of one stored entry, for listings.
#[derive(Debug, Clone)]
pub struct CacheEntryInfo {
  pub url: String,
  pub status: u16,
  pub size: usize,
  pub cached_at: DateTime<Utc>,
}

/// Trait for hosts that keep named cache stores.
///
/// A store is created by `open` (or implicitly by `put`) and removed as a
/// whole by `delete`. Entries are only ever stored for GET requests and are
/// never evicted one by one.
pub trait CacheStorage: Send + Sync {
  /// Create the named store if it does not exist yet.
  fn open(&self, name: &str) -> Result<()>;

  /// Whether the named store exists.
  fn has(&self, name: &str) -> Result<bool>;

  /// Names of all stores, in creation order.
  fn keys(&self) -> Result<Vec<String>>;

  /// Delete a store with all of its entries. Returns false if it did not exist.
  fn delete(&self, name: &str) -> Result<bool>;

  /// Store a response for a GET request, replacing any previous entry.
  fn put(&self, name: &str, request: &Request, response: &Response) -> Result<()>;

  /// Look up a request in one store.
  fn match_in(&self, name: &str, request: &Request) -> Result<Option<CachedResponse>>;

  /// List the entries of one store.
  fn entries(&self, name: &str) -> Result<Vec<CacheEntryInfo>>;

  /// Look up a request across every store, oldest store first.
  fn match_any(&self, request: &Request) -> Result<Option<CachedResponse>> {
    for name in self.keys()? {
      if let Some(found) = self.match_in(&name, request)? {
        return Ok(Some(found));
      }
    }
    Ok(None)
  }
}

/// The request header values a stored response varies on.
///
/// Captured at `put` time from the request, for every header the response
/// names in `Vary`. A later request only matches if it carries the same values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaryKey(pub Vec<(String, Option<String>)>);

impl VaryKey {
  pub fn capture(request: &Request, response: &Response) -> Self {
    Self(
      response
        .vary()
        .into_iter()
        .map(|name| {
          let value = request.header(&name).map(String::from);
          (name, value)
        })
        .collect(),
    )
  }

  pub fn matches(&self, request: &Request) -> bool {
    self.0.iter().all(|(name, value)| {
      // `Vary: *` means no request can ever be considered equivalent
      name != "*" && request.header(name) == value.as_deref()
    })
  }
}
