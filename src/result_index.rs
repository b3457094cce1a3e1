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

//! Indexes the settled multi-get calls of one dispatch cycle by key.
//!
//! Found items carry more attributes than their keys, and the store does not
//! say which attributes form the key. The index projects every found item onto
//! each key schema requested from its collection in the cycle, so that a
//! lookup is a single hash probe with structural key equality.

use std::collections::HashMap;
use std::collections::HashSet;
use std::io;
use std::sync::Arc;

use log::debug;

use crate::attr_value::Record;
use crate::errors::LoadError;
use crate::key::Key;
use crate::key::KeySchema;
use crate::key::LookupRequest;
use crate::multi_get::MultiGetOutput;
use crate::multi_get::MultiGetRequest;

/// A multi-get call together with how it settled.
pub type Settled<T> = (MultiGetRequest, Result<MultiGetOutput<T>, io::Error>);

/// What the cycle's calls say about one lookup.
#[derive(Debug)]
pub enum Outcome<'a, T> {
    Found(&'a T),
    NotFound,
    /// Listed as unprocessed by the store.
    NotProcessed,
    /// The call carrying this key failed.
    Failed(&'a Arc<io::Error>),
}

impl<T> Outcome<'_, T>
where T: Clone
{
    /// Converts into what a caller of `request` receives.
    pub fn to_result(&self, request: &LookupRequest) -> Result<Option<T>, LoadError> {
        match self {
            Outcome::Found(item) => Ok(Some((*item).clone())),
            Outcome::NotFound => Ok(None),
            Outcome::NotProcessed => Err(LoadError::NotProcessed {
                collection: request.collection().to_string(),
                key: request.key().clone(),
            }),
            Outcome::Failed(e) => Err(LoadError::Transport((*e).clone())),
        }
    }
}

#[derive(Debug)]
struct CollectionIndex<T> {
    found: HashMap<Key, T>,
    unprocessed: HashSet<Key>,
    failed: HashMap<Key, Arc<io::Error>>,
}

impl<T> Default for CollectionIndex<T> {
    fn default() -> Self {
        Self {
            found: HashMap::new(),
            unprocessed: HashSet::new(),
            failed: HashMap::new(),
        }
    }
}

/// Read-only lookup structure for one dispatch cycle.
#[derive(Debug)]
pub struct ResultIndex<T> {
    collections: HashMap<String, CollectionIndex<T>>,
}

impl<T> ResultIndex<T>
where T: Record
{
    /// Builds the index from every call of the cycle, successful or not.
    pub fn build(settled: impl IntoIterator<Item = Settled<T>>) -> Self {
        let settled: Vec<Settled<T>> = settled.into_iter().collect();

        let schemas = requested_schemas(settled.iter().map(|(req, _)| req));
        let mut collections: HashMap<String, CollectionIndex<T>> = HashMap::new();

        for (request, result) in settled {
            match result {
                Ok(output) => {
                    for (collection, items) in output.found {
                        let Some(collection_schemas) = schemas.get(&collection) else {
                            debug!(
                                "ResultIndex: ignore {} items of unrequested collection {}",
                                items.len(),
                                collection
                            );
                            continue;
                        };

                        let index = collections.entry(collection).or_default();
                        for item in items {
                            for schema in collection_schemas {
                                if let Some(key) = Key::project(&item, schema) {
                                    index.found.entry(key).or_insert_with(|| item.clone());
                                }
                            }
                        }
                    }

                    for (collection, keys) in output.unprocessed {
                        collections
                            .entry(collection)
                            .or_default()
                            .unprocessed
                            .extend(keys);
                    }
                }
                Err(e) => {
                    let e = Arc::new(e);
                    for (collection, keys) in request.iter() {
                        let index = collections.entry(collection.to_string()).or_default();
                        for key in keys {
                            index.failed.insert(key.clone(), e.clone());
                        }
                    }
                }
            }
        }

        Self { collections }
    }
}

impl<T> ResultIndex<T> {
    /// Classifies a lookup.
    ///
    /// Precedence: a failed call, then found, then unprocessed. A key in
    /// none of them does not exist.
    pub fn lookup(&self, request: &LookupRequest) -> Outcome<'_, T> {
        let Some(index) = self.collections.get(request.collection()) else {
            return Outcome::NotFound;
        };

        let key = request.key();

        if let Some(e) = index.failed.get(key) {
            return Outcome::Failed(e);
        }
        if let Some(item) = index.found.get(key) {
            return Outcome::Found(item);
        }
        if index.unprocessed.contains(key) {
            return Outcome::NotProcessed;
        }
        Outcome::NotFound
    }
}

/// Distinct key schemas requested per collection.
fn requested_schemas<'a>(
    requests: impl IntoIterator<Item = &'a MultiGetRequest>,
) -> HashMap<String, Vec<KeySchema>> {
    let mut schemas: HashMap<String, Vec<KeySchema>> = HashMap::new();

    for request in requests {
        for (collection, keys) in request.iter() {
            let entry = schemas.entry(collection.to_string()).or_default();
            for key in keys {
                let schema = key.schema();
                if !entry.contains(&schema) {
                    entry.push(schema);
                }
            }
        }
    }

    schemas
}
