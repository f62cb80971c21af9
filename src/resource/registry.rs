//! Scheme-keyed collection lookup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};

use super::ResourceCollection;

type Factory = Box<dyn Fn(&str) -> Result<Arc<dyn ResourceCollection>> + Send + Sync>;

/// Maps URI schemes to collection factories.
///
/// The first lookup for a URI builds the collection and caches it;
/// later lookups reuse the same instance, so every consumer of one URI
/// observes one materialization.
#[derive(Default)]
pub struct CollectionRegistry {
    factories: HashMap<String, Factory>,
    cache: Mutex<HashMap<String, Arc<dyn ResourceCollection>>>,
}

impl CollectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, scheme: impl Into<String>, factory: F)
    where
        F: Fn(&str) -> Result<Arc<dyn ResourceCollection>> + Send + Sync + 'static,
    {
        self.factories.insert(scheme.into(), Box::new(factory));
    }

    /// The collection for a URI, built on first use.
    pub fn get(&self, uri: &str) -> Result<Arc<dyn ResourceCollection>> {
        if let Some(cached) = self.cache.lock().unwrap().get(uri) {
            return Ok(cached.clone());
        }

        let Some(scheme) = uri.split(':').next().filter(|s| !s.is_empty() && *s != uri) else {
            bail!("URI has no scheme: {}", uri);
        };
        let Some(factory) = self.factories.get(scheme) else {
            bail!("no collection registered for scheme {}", scheme);
        };

        let collection = factory(uri)?;
        self.cache
            .lock()
            .unwrap()
            .insert(uri.to_string(), collection.clone());
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::FileCollection;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn caches_per_uri_and_dispatches_per_scheme() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();

        let mut registry = CollectionRegistry::new();
        registry.register("file", move |uri| {
            counted.fetch_add(1, Ordering::SeqCst);
            let path = uri.strip_prefix("file://").unwrap_or(uri);
            Ok(Arc::new(FileCollection::new(path)) as Arc<dyn ResourceCollection>)
        });

        let a1 = registry.get("file:///tmp/sketches").unwrap();
        let a2 = registry.get("file:///tmp/sketches").unwrap();
        assert!(Arc::ptr_eq(&a1, &a2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        registry.get("file:///tmp/other").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert!(registry.get("gopher://nope").is_err());
        assert!(registry.get("noscheme").is_err());
    }
}
