//! In-memory snapshot of the loader archive's entry names.
//!
//! The cache is owned by the archive backend and only touched while its
//! state lock is held. It is replaced after every archive read or write the
//! backend performs, so it is `None` only before the first read and after a
//! swap that had to be abandoned.

use crate::naming::EntryMatcher;

#[derive(Debug, Default)]
pub struct EntryCache {
    names: Option<Vec<String>>,
}

impl EntryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_populated(&self) -> bool {
        self.names.is_some()
    }

    /// Replace the snapshot with a fresh listing.
    pub fn replace(&mut self, names: Vec<String>) {
        self.names = Some(names);
    }

    /// Forget the snapshot; the next lookup re-reads the archive.
    pub fn invalidate(&mut self) {
        self.names = None;
    }

    /// Entry names in archive order, if known.
    pub fn names(&self) -> Option<&[String]> {
        self.names.as_deref()
    }

    /// First cached entry accepted by `matcher`.
    ///
    /// Returns `None` both for "no match" and for an unpopulated cache;
    /// callers check [`EntryCache::is_populated`] first.
    pub fn find(&self, matcher: &EntryMatcher) -> Option<&str> {
        self.names
            .as_ref()?
            .iter()
            .find(|name| matcher.is_match(name))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_starts_unpopulated() {
        let cache = EntryCache::new();
        assert!(!cache.is_populated());
        assert!(cache.names().is_none());
        assert!(cache.find(&EntryMatcher::new("foo").unwrap()).is_none());
    }

    #[test]
    fn test_find_first_match() {
        let mut cache = EntryCache::new();
        cache.replace(names(&["dependency-metadata.json", "01-foo.py", "10-foo.pyc", "10-bar.py"]));

        let matcher = EntryMatcher::new("foo").unwrap();
        assert_eq!(cache.find(&matcher), Some("01-foo.py"));
        assert!(cache.find(&EntryMatcher::new("baz").unwrap()).is_none());
    }

    #[test]
    fn test_replace_and_invalidate() {
        let mut cache = EntryCache::new();
        cache.replace(names(&["01-foo.py"]));
        assert!(cache.is_populated());

        cache.replace(names(&["10-bar.py"]));
        assert_eq!(cache.names().unwrap(), &["10-bar.py".to_string()]);
        assert!(cache.find(&EntryMatcher::new("foo").unwrap()).is_none());

        cache.invalidate();
        assert!(!cache.is_populated());
    }
}
