// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Provides a simple in-memory implementation of the multi-get API.
//!
//! [`MemoryStore`] keeps items in memory and answers multi-get calls the way a
//! remote store would, including its request validation. Unprocessed keys and
//! whole-call failures can be injected. It's primarily intended for testing and
//! demonstration purposes.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::io;
use std::sync::Mutex;
use std::sync::PoisonError;

use log::warn;

use crate::attr_value::AttrMap;
use crate::config::DEFAULT_MAX_BATCH_SIZE;
use crate::key::Key;
use crate::key::LookupRequest;
use crate::multi_get::MultiGet;
use crate::multi_get::MultiGetOutput;
use crate::multi_get::MultiGetRequest;

/// An in-memory store of [`AttrMap`] items, by collection.
///
/// Like a real store it rejects calls with more than `max_keys_per_call` keys
/// or with a duplicate key, as [`io::ErrorKind::InvalidInput`].
///
/// # Examples
///
/// ```
/// use batch_get_loader::impls::memory::MemoryStore;
/// use batch_get_loader::AttrMap;
/// use batch_get_loader::Key;
/// use batch_get_loader::MultiGet;
/// use batch_get_loader::MultiGetRequest;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> std::io::Result<()> {
/// let mut item = AttrMap::new();
/// item.insert("id".to_string(), "id1".into());
/// item.insert("name".to_string(), "foo".into());
///
/// let store = MemoryStore::new()
///     .with_item("users", item.clone())
///     .with_unprocessed("users", Key::single("id", "id2"));
///
/// let req = MultiGetRequest::new().with_keys("users", [
///     Key::single("id", "id1"),
///     Key::single("id", "id2"),
///     Key::single("id", "id3"),
/// ]);
/// let out = store.multi_get(&req).await?;
///
/// assert_eq!(Some(&vec![item]), out.found.get("users"));
/// assert_eq!(Some(&vec![Key::single("id", "id2")]), out.unprocessed.get("users"));
/// assert_eq!(1, store.call_count());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryStore {
    collections: BTreeMap<String, Vec<AttrMap>>,
    unprocessed: HashSet<LookupRequest>,
    /// Collections whose calls fail as a whole.
    failing: BTreeMap<String, (io::ErrorKind, String)>,
    max_keys_per_call: Option<usize>,
    calls: Mutex<Vec<MultiGetRequest>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            collections: BTreeMap::new(),
            unprocessed: HashSet::new(),
            failing: BTreeMap::new(),
            max_keys_per_call: Some(DEFAULT_MAX_BATCH_SIZE),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an item to `collection`. The item must contain its key attributes.
    pub fn with_item(mut self, collection: &str, item: AttrMap) -> Self {
        self.insert(collection, item);
        self
    }

    pub fn with_items(
        mut self,
        collection: &str,
        items: impl IntoIterator<Item = AttrMap>,
    ) -> Self {
        for item in items {
            self.insert(collection, item);
        }
        self
    }

    /// Makes the store report `key` of `collection` as unprocessed, even if it exists.
    pub fn with_unprocessed(mut self, collection: &str, key: Key) -> Self {
        self.unprocessed.insert(LookupRequest::new(collection, key));
        self
    }

    /// Makes every call that includes `collection` fail with the given error.
    pub fn with_failing_collection(
        mut self,
        collection: &str,
        kind: io::ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        self.failing
            .insert(collection.to_string(), (kind, message.into()));
        self
    }

    /// Sets the per-call key limit; `None` disables the check.
    pub fn with_max_keys_per_call(mut self, max: Option<usize>) -> Self {
        self.max_keys_per_call = max;
        self
    }

    pub fn insert(&mut self, collection: &str, item: AttrMap) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(item);
    }

    /// Every request received so far, in arrival order.
    pub fn calls(&self) -> Vec<MultiGetRequest> {
        self.lock_calls().clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock_calls().len()
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<MultiGetRequest>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn validate(&self, request: &MultiGetRequest) -> Result<(), io::Error> {
        if let Some(max) = self.max_keys_per_call {
            if request.len() > max {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("too many keys in one call: {} > {}", request.len(), max),
                ));
            }
        }

        for (collection, keys) in request.iter() {
            let mut seen = HashSet::with_capacity(keys.len());
            for key in keys {
                if !seen.insert(key) {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("duplicate key in {}: {}", collection, key),
                    ));
                }
            }
        }

        Ok(())
    }

    fn find(&self, collection: &str, key: &Key) -> Option<&AttrMap> {
        self.collections
            .get(collection)?
            .iter()
            .find(|item| key.matches(*item))
    }
}

#[async_trait::async_trait]
impl MultiGet for MemoryStore {
    type Item = AttrMap;

    async fn multi_get(
        &self,
        request: &MultiGetRequest,
    ) -> Result<MultiGetOutput<AttrMap>, io::Error> {
        self.lock_calls().push(request.clone());

        self.validate(request)?;

        for collection in request.collections() {
            if let Some((kind, message)) = self.failing.get(collection) {
                warn!("MemoryStore: injected failure for collection {}", collection);
                return Err(io::Error::new(*kind, message.clone()));
            }
        }

        let mut output = MultiGetOutput::new();

        for (collection, keys) in request.iter() {
            for key in keys {
                let lookup = LookupRequest::new(collection, key.clone());
                if self.unprocessed.contains(&lookup) {
                    output = output.with_unprocessed(collection, [key.clone()]);
                } else if let Some(item) = self.find(collection, key) {
                    output = output.with_found(collection, [item.clone()]);
                }
            }
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::attr_value::AttrValue;

    fn item(id: &str) -> AttrMap {
        let mut m = AttrMap::new();
        m.insert("id".to_string(), AttrValue::from(id));
        m.insert("v".to_string(), AttrValue::from(format!("value-{}", id)));
        m
    }

    fn keys(ids: &[&str]) -> Vec<Key> {
        ids.iter().map(|id| Key::single("id", *id)).collect()
    }

    #[tokio::test]
    async fn test_found_missing_and_unprocessed() -> anyhow::Result<()> {
        let store = MemoryStore::new()
            .with_items("t1", [item("a"), item("b")])
            .with_unprocessed("t1", Key::single("id", "b"));

        let req = MultiGetRequest::new().with_keys("t1", keys(&["a", "b", "c"]));
        let out = store.multi_get(&req).await?;

        assert_eq!(Some(&vec![item("a")]), out.found.get("t1"));
        assert_eq!(Some(&keys(&["b"])), out.unprocessed.get("t1"));
        assert_eq!(vec![req], store.calls());
        Ok(())
    }

    #[tokio::test]
    async fn test_rejects_oversized_call() {
        let store = MemoryStore::new().with_max_keys_per_call(Some(2));

        let req = MultiGetRequest::new().with_keys("t1", keys(&["a", "b", "c"]));
        let err = store.multi_get(&req).await.unwrap_err();
        assert_eq!(io::ErrorKind::InvalidInput, err.kind());

        let store = store.with_max_keys_per_call(None);
        assert!(store.multi_get(&req).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejects_duplicate_keys() {
        let store = MemoryStore::new();

        let req = MultiGetRequest::new().with_keys("t1", keys(&["a", "a"]));
        let err = store.multi_get(&req).await.unwrap_err();
        assert_eq!(io::ErrorKind::InvalidInput, err.kind());

        // The same key in two collections is not a duplicate.
        let req = MultiGetRequest::new()
            .with_keys("t1", keys(&["a"]))
            .with_keys("t2", keys(&["a"]));
        assert!(store.multi_get(&req).await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_collection() {
        let store = MemoryStore::new()
            .with_item("t1", item("a"))
            .with_failing_collection("t2", io::ErrorKind::TimedOut, "timed out");

        let req = MultiGetRequest::new().with_keys("t1", keys(&["a"]));
        assert!(store.multi_get(&req).await.is_ok());

        let req = req.with_keys("t2", keys(&["a"]));
        let err = store.multi_get(&req).await.unwrap_err();
        assert_eq!(io::ErrorKind::TimedOut, err.kind());
        assert_eq!("timed out", err.to_string());

        assert_eq!(2, store.call_count());
    }
}
