use std::{num::NonZeroUsize, sync::Mutex};

use lru::LruCache;
use metrics::counter;

use crate::cache::lock::mutex_lock;
use crate::domain::pointer::normalize_word;

const SOURCE: &str = "application::normalizer";

/// Memoised front for [`normalize_word`].
///
/// Results live in a bounded least-recently-used memo shared by all request
/// tasks.
pub struct WordNormalizer {
    memo: Mutex<LruCache<String, String>>,
}

impl WordNormalizer {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            memo: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn normalize(&self, raw: &str) -> String {
        if let Some(hit) = mutex_lock(&self.memo, SOURCE, "normalize.get").get(raw) {
            counter!("infinitewiki_normalizer_hit_total").increment(1);
            return hit.clone();
        }

        let normalized = normalize_word(raw);
        mutex_lock(&self.memo, SOURCE, "normalize.put").put(raw.to_string(), normalized.clone());
        normalized
    }

    /// Number of memoised words.
    pub fn len(&self) -> usize {
        mutex_lock(&self.memo, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        mutex_lock(&self.memo, SOURCE, "capacity").cap().get()
    }
}
