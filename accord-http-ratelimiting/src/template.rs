//! Observed per-bucket defaults used to assume a budget before a response
//! arrives.

use super::bucket::Bucket;
use std::{collections::HashMap, sync::Mutex};

/// Most recently observed parameters of a bucket.
#[derive(Clone, Copy, Debug)]
struct Template {
    /// Total requests allotted per window.
    limit: u64,
    /// Window length in milliseconds.
    reset_after: u64,
}

/// Per-bucket defaults learned from observation.
///
/// When a fingerprint maps to a known bucket but no live budget exists,
/// typically right after an eviction, the store synthesizes a full budget
/// from the last seen `(limit, reset_after)` pair. This is the only
/// mechanism that creates a budget before a response arrives.
#[derive(Debug, Default)]
pub struct TemplateStore {
    templates: Mutex<HashMap<Box<str>, Template>>,
}

impl TemplateStore {
    /// Record the latest observed parameters of a bucket.
    pub(crate) fn upsert(&self, bucket: &str, limit: u64, reset_after: u64) {
        self.templates
            .lock()
            .expect("templates poisoned")
            .entry(bucket.into())
            .and_modify(|template| {
                template.limit = limit;
                template.reset_after = reset_after;
            })
            .or_insert(Template { limit, reset_after });
    }

    /// Construct a fresh, full budget for a bucket from its template.
    ///
    /// Returns `None` if the bucket has never been observed.
    pub(crate) fn create_assumed(&self, bucket: &str, now: u64) -> Option<Bucket> {
        let templates = self.templates.lock().expect("templates poisoned");
        let template = templates.get(bucket)?;

        Some(Bucket::new(
            bucket.into(),
            template.limit,
            template.limit,
            template.reset_after,
            now,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::TemplateStore;
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(TemplateStore: Debug, Default, Send, Sync);

    #[test]
    fn unknown_bucket_has_no_template() {
        let store = TemplateStore::default();

        assert!(store.create_assumed("missing", 0).is_none());
    }

    #[test]
    fn assumed_budget_is_full() {
        let store = TemplateStore::default();
        store.upsert("b1", 5, 1000);

        let bucket = store.create_assumed("b1", 100).unwrap();
        assert_eq!(5, bucket.limit());
        assert_eq!(5, bucket.remaining());
        assert_eq!(1000, bucket.reset_in(100));
    }

    #[test]
    fn upsert_overwrites() {
        let store = TemplateStore::default();
        store.upsert("b1", 5, 1000);
        store.upsert("b1", 10, 500);

        let bucket = store.create_assumed("b1", 0).unwrap();
        assert_eq!(10, bucket.limit());
        assert_eq!(500, bucket.reset_in(0));
    }
}
