use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::transport::Transport;

/// Marker parameter distinguishing AJAX partial responses from the
/// full-page rendering of the same URL in the browser cache.
const AJAX_MARKER: &str = "ajax=1";

/// Join a URL and a querystring with `?`/`&` as appropriate.
pub fn compute_url(url: &str, querystring: Option<&str>) -> String {
    match querystring {
        Some(qs) if !qs.is_empty() => {
            let sep = if url.contains('?') { '&' } else { '?' };
            format!("{url}{sep}{qs}")
        }
        _ => url.to_string(),
    }
}

fn content_hash(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}

/// Result of a cache-checked fetch.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub body: String,
    pub from_cache: bool,
    pub cache_key: String,
    /// The querystring as requested, without the AJAX marker.
    pub querystring: Option<String>,
}

/// Page-scoped cache of fetched HTML fragments, content-addressed so
/// two keys with byte-identical (trimmed) payloads share one stored
/// payload.
#[derive(Debug, Default)]
pub struct ResponseCache {
    keys_to_hashes: HashMap<String, String>,
    hashes_to_data: HashMap<String, String>,
    protected_suffixes: Vec<String>,
}

impl ResponseCache {
    pub fn new(protected_suffixes: Vec<String>) -> Self {
        Self {
            protected_suffixes,
            ..Self::default()
        }
    }

    pub fn key(&self, url: &str, querystring: Option<&str>) -> String {
        compute_url(url, querystring)
    }

    pub fn has(&self, key: &str) -> bool {
        self.keys_to_hashes.contains_key(key)
    }

    pub fn set(&mut self, key: &str, data: &str) {
        let data = data.trim();
        let hash = content_hash(data);
        self.hashes_to_data
            .entry(hash.clone())
            .or_insert_with(|| data.to_string());
        self.keys_to_hashes.insert(key.to_string(), hash);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        let hash = self.keys_to_hashes.get(key)?;
        self.hashes_to_data.get(hash).map(String::as_str)
    }

    /// Alias `key_to` to `key_from`'s current payload without copying it.
    pub fn copy(&mut self, key_from: &str, key_to: &str) {
        if let Some(hash) = self.keys_to_hashes.get(key_from).cloned() {
            self.keys_to_hashes.insert(key_to.to_string(), hash);
        }
    }

    /// Bulk invalidation after a server-side mutation. With
    /// `keep_protected`, keys matching a protected suffix survive;
    /// payloads no longer referenced by any key are dropped.
    pub fn clear(&mut self, keep_protected: bool) {
        if !keep_protected {
            self.keys_to_hashes.clear();
            self.hashes_to_data.clear();
            return;
        }
        self.keys_to_hashes
            .retain(|key, _| self.protected_suffixes.iter().any(|s| key.ends_with(s)));
        let live: HashSet<&String> = self.keys_to_hashes.values().collect();
        self.hashes_to_data = self
            .hashes_to_data
            .drain()
            .filter(|(hash, _)| live.contains(hash))
            .collect();
    }

    /// Serve from cache or issue the network GET (with the AJAX marker
    /// appended) and store the result.
    pub async fn fetch(
        &mut self,
        transport: &dyn Transport,
        url: &str,
        querystring: Option<&str>,
    ) -> Result<Fetched> {
        let cache_key = self.key(url, querystring);
        if let Some(body) = self.get(&cache_key) {
            tracing::debug!(key = %cache_key, "cache hit");
            return Ok(Fetched {
                body: body.to_string(),
                from_cache: true,
                cache_key,
                querystring: querystring.map(str::to_string),
            });
        }

        let marked = if url.contains(AJAX_MARKER)
            || querystring.is_some_and(|qs| qs.contains(AJAX_MARKER))
        {
            querystring.map(str::to_string)
        } else {
            match querystring {
                Some(qs) if !qs.is_empty() => Some(format!("{qs}&{AJAX_MARKER}")),
                _ => Some(AJAX_MARKER.to_string()),
            }
        };

        let body = transport.get(url, marked.as_deref()).await?;
        self.set(&cache_key, &body);
        Ok(Fetched {
            body: body.trim().to_string(),
            from_cache: false,
            cache_key,
            querystring: querystring.map(str::to_string),
        })
    }

    #[cfg(test)]
    fn stored_payloads(&self) -> usize {
        self.hashes_to_data.len()
    }
}
