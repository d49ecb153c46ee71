//! Process-wide `(destination, queue) -> RemoteQueue` cache (§5 "Shared
//! state"). A simple map with no eviction, lifetime = process lifetime,
//! exactly as `spec.md` describes it: embedding frontends that perform
//! many operations against the same queue across a workflow can reuse
//! one SSH session via [`get_or_connect`] instead of opening one per
//! call, and tear them all down at once with [`shutdown_cache`].
//!
//! The CLI binary itself doesn't use this — one command is one
//! destination is one session — but the library exposes it for
//! embedders, the way the teacher crate is a library first and a thin
//! CLI wrapper second.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use tokio::sync::Mutex;

use crate::destination::Destination;
use crate::error::Result;
use crate::remote_queue::RemoteQueue;

type CacheKey = (String, String);

static CACHE: Lazy<Mutex<HashMap<CacheKey, Arc<RemoteQueue>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Look up or establish a [`RemoteQueue`] for `(destination, queue_path)`.
pub async fn get_or_connect(destination: Destination, queue_path: String) -> Result<Arc<RemoteQueue>> {
    let key = (destination.format(), queue_path.clone());

    let mut cache = CACHE.lock().await;
    if let Some(existing) = cache.get(&key) {
        return Ok(Arc::clone(existing));
    }

    let remote_queue = Arc::new(RemoteQueue::connect(destination, queue_path).await?);
    cache.insert(key, Arc::clone(&remote_queue));
    Ok(remote_queue)
}

/// Close every cached session. Entries still shared by other `Arc`
/// holders are left alone; this is best-effort, matching `spec.md` §9's
/// "teardown hook that closes every cached controller on process exit".
pub async fn shutdown_cache() {
    let mut cache = CACHE.lock().await;
    for (_, remote_queue) in cache.drain() {
        if let Ok(remote_queue) = Arc::try_unwrap(remote_queue) {
            let _ = remote_queue.close().await;
        }
    }
}
