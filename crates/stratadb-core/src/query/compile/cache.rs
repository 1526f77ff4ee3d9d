//! Process-wide cache of compiled operations, keyed by structural
//! fingerprint. Compilation is pure in (schema, tree), so a hit is always
//! safe to reuse across callers and threads.

use crate::query::compile::{CompiledOp, OpFingerprint};
use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicUsize, Ordering},
    },
};

static CACHE: OnceLock<Mutex<BTreeMap<OpFingerprint, Arc<CompiledOp>>>> = OnceLock::new();
static HITS: AtomicUsize = AtomicUsize::new(0);
static MISSES: AtomicUsize = AtomicUsize::new(0);

fn cache() -> &'static Mutex<BTreeMap<OpFingerprint, Arc<CompiledOp>>> {
    CACHE.get_or_init(|| Mutex::new(BTreeMap::new()))
}

pub(crate) fn get(fingerprint: &OpFingerprint) -> Option<Arc<CompiledOp>> {
    cache().lock().get(fingerprint).cloned()
}

pub(crate) fn insert(fingerprint: OpFingerprint, op: Arc<CompiledOp>) {
    cache().lock().insert(fingerprint, op);
}

pub(crate) fn record_hit() {
    HITS.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_miss() {
    MISSES.fetch_add(1, Ordering::Relaxed);
}

///
/// CacheStats
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub size: usize,
}

#[must_use]
pub fn cache_stats() -> CacheStats {
    CacheStats {
        hits: HITS.load(Ordering::Relaxed),
        misses: MISSES.load(Ordering::Relaxed),
        size: cache().lock().len(),
    }
}

/// Drop every cached operation. Counters are left running.
pub fn clear_cache() {
    cache().lock().clear();
}
