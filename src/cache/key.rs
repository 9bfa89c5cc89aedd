//! Request identity for cache entries.

use sha2::{Digest, Sha256};

use crate::http::Request;

/// Stable, fixed-length key for a cacheable request.
///
/// Only GET requests are stored, so the URL (without its fragment) is the
/// whole identity; header variance is checked separately through `VaryKey`.
pub fn request_key(request: &Request) -> String {
  let mut url = request.url.clone();
  url.set_fragment(None);

  let mut hasher = Sha256::new();
  hasher.update(url.as_str().as_bytes());
  hex::encode(hasher.finalize())
}
