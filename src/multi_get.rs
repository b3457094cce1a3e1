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

//! Defines the multi-get interface of the backing store.
//!
//! The [`MultiGet`] trait is the only thing the loader requires from a store
//! client: one call that takes keys across several collections and returns
//! the items it found plus the keys it did not get around to processing.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::attr_value::Record;
use crate::key::Key;

/// The argument of a single multi-get call: keys to fetch, by collection.
///
/// The store rejects a call that lists the same key twice; the loader never
/// builds one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub struct MultiGetRequest {
    keys: BTreeMap<String, Vec<Key>>,
}

impl MultiGetRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends keys to the list of `collection`.
    pub fn extend(&mut self, collection: &str, keys: impl IntoIterator<Item = Key>) {
        self.keys
            .entry(collection.to_string())
            .or_default()
            .extend(keys);
    }

    /// Builder-style variant of [`Self::extend`].
    pub fn with_keys(mut self, collection: &str, keys: impl IntoIterator<Item = Key>) -> Self {
        self.extend(collection, keys);
        self
    }

    /// Total number of keys across all collections.
    pub fn len(&self) -> usize {
        self.keys.values().map(|k| k.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The keys requested from `collection`, empty if none.
    pub fn keys(&self, collection: &str) -> &[Key] {
        self.keys.get(collection).map(|k| k.as_slice()).unwrap_or(&[])
    }

    pub fn collections(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(|c| c.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Key])> {
        self.keys.iter().map(|(c, k)| (c.as_str(), k.as_slice()))
    }

    pub fn into_inner(self) -> BTreeMap<String, Vec<Key>> {
        self.keys
    }
}

/// The response of a successful multi-get call.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub struct MultiGetOutput<T> {
    /// Items found, by collection. Each item embeds its own key attributes.
    pub found: BTreeMap<String, Vec<T>>,

    /// Keys the store accepted but did not process, by collection.
    pub unprocessed: BTreeMap<String, Vec<Key>>,
}

impl<T> Default for MultiGetOutput<T> {
    fn default() -> Self {
        Self {
            found: BTreeMap::new(),
            unprocessed: BTreeMap::new(),
        }
    }
}

impl<T> MultiGetOutput<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_found(mut self, collection: &str, items: impl IntoIterator<Item = T>) -> Self {
        self.found
            .entry(collection.to_string())
            .or_default()
            .extend(items);
        self
    }

    pub fn with_unprocessed(
        mut self,
        collection: &str,
        keys: impl IntoIterator<Item = Key>,
    ) -> Self {
        self.unprocessed
            .entry(collection.to_string())
            .or_default()
            .extend(keys);
        self
    }
}

/// A key-value store client exposing a multi-get operation.
///
/// # Contract
///
/// - `Ok(output)`: the call was accepted. A requested key appears in
///   `output.found` (as the item holding it), in `output.unprocessed`, or in
///   neither when it does not exist.
/// - `Err(e)`: the call failed as a whole, e.g., a network or protocol error.
///   No key of the request is resolved by this call.
///
/// The client does not need to enforce the batch size limit; the loader never
/// sends more than its configured maximum.
#[async_trait::async_trait]
pub trait MultiGet: Send + Sync + 'static {
    /// The item type stored in the collections.
    type Item: Record;

    async fn multi_get(
        &self,
        request: &MultiGetRequest,
    ) -> Result<MultiGetOutput<Self::Item>, io::Error>;
}

#[async_trait::async_trait]
impl<C> MultiGet for Arc<C>
where C: MultiGet
{
    type Item = C::Item;

    async fn multi_get(
        &self,
        request: &MultiGetRequest,
    ) -> Result<MultiGetOutput<Self::Item>, io::Error> {
        (**self).multi_get(request).await
    }
}
