//! Content locations, cache keys and the injected fetch capability.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use futures_util::future::LocalBoxFuture;

use crate::error::Result;

/// Location of a content, plus its position inside nested composites.
///
/// Inner tiles share their parent's URL; the composite path keeps their
/// cache keys distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource {
    url: String,
    composite_path: Vec<usize>,
}

impl Resource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            composite_path: Vec::new(),
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sibling indices from the outermost composite down to this content.
    #[must_use]
    pub fn composite_path(&self) -> &[usize] {
        &self.composite_path
    }

    /// Resource for inner tile `index` of the composite at this location.
    #[must_use]
    pub fn composite_child(&self, index: usize) -> Self {
        let mut composite_path = self.composite_path.clone();
        composite_path.push(index);
        Self {
            url: self.url.clone(),
            composite_path,
        }
    }

    /// Composite path joined with underscores, e.g. `"0_1"`.
    #[must_use]
    pub fn composite_index(&self) -> Option<String> {
        if self.composite_path.is_empty() {
            return None;
        }
        let parts: Vec<String> = self.composite_path.iter().map(ToString::to_string).collect();
        Some(parts.join("_"))
    }

    /// Key under which this content's bytes are cached.
    #[must_use]
    pub fn cache_key(&self) -> String {
        match self.composite_index() {
            None => self.url.clone(),
            Some(index) => {
                let separator = if self.url.contains('?') { '&' } else { '?' };
                format!("{}{separator}compositeIndex={index}", self.url)
            }
        }
    }
}

/// Transport used to retrieve content bytes.
pub trait ResourceFetcher {
    fn fetch_array_buffer<'a>(&'a self, url: &'a str) -> LocalBoxFuture<'a, Result<Vec<u8>>>;
}

/// Storage for fetched content bytes.
pub trait Cache {
    fn get(&self, key: &str) -> Option<Rc<[u8]>>;
    fn insert(&self, key: String, bytes: Rc<[u8]>);
}

/// Cache that never stores anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl Cache for NoCache {
    fn get(&self, _key: &str) -> Option<Rc<[u8]>> {
        None
    }

    fn insert(&self, _key: String, _bytes: Rc<[u8]>) {}
}

/// In-memory cache keyed by [`Resource::cache_key`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RefCell<HashMap<String, Rc<[u8]>>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<Rc<[u8]>> {
        self.entries.borrow().get(key).cloned()
    }

    fn insert(&self, key: String, bytes: Rc<[u8]>) {
        self.entries.borrow_mut().insert(key, bytes);
    }
}

/// Fetches content bytes through a cache.
pub struct ResourceLoader<F, C = NoCache> {
    fetcher: F,
    cache: C,
}

impl<F: ResourceFetcher> ResourceLoader<F, NoCache> {
    pub fn new(fetcher: F) -> Self {
        Self::with_cache(fetcher, NoCache)
    }
}

impl<F: ResourceFetcher, C: Cache> ResourceLoader<F, C> {
    pub fn with_cache(fetcher: F, cache: C) -> Self {
        Self { fetcher, cache }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Bytes for `resource`, from the cache when present.
    pub async fn fetch(&self, resource: &Resource) -> Result<Rc<[u8]>> {
        let key = resource.cache_key();
        if let Some(bytes) = self.cache.get(&key) {
            tracing::trace!("Cache hit for {}", key);
            return Ok(bytes);
        }
        let bytes: Rc<[u8]> = self.fetcher.fetch_array_buffer(resource.url()).await?.into();
        tracing::debug!("Fetched {} bytes from {}", bytes.len(), resource.url());
        self.cache.insert(key, Rc::clone(&bytes));
        Ok(bytes)
    }
}
