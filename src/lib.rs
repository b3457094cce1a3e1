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

//! # Batch Get Loader
//!
//! Coalesces concurrent point lookups into multi-get calls against a key-value
//! store that caps the number of keys per call and forbids duplicate keys.
//!
//! Callers look up one `(collection, key)` at a time. Lookups issued in the same
//! scheduling turn are deduplicated, split into calls that respect the cap, sent
//! to the store, and fanned back out so that every caller receives the found
//! item, `None` for a missing key, or a retryable error for a key the store did
//! not process.
//!
//! ## Core Components
//!
//! - [`BatchingLoader`]: the per-caller `load()` entry point and dispatch cycle
//! - [`MultiGet`]: the store client interface the loader talks to
//! - [`partition()`]: dedup and chunking of one cycle's lookups
//! - [`ResultIndex`]: fan-out lookup structure built from the store's answers
//! - [`Key`] and [`AttrValue`]: typed keys with structural equality
//!
//! ## Usage Example
//!
//! ```rust
//! use batch_get_loader::impls::memory::MemoryStore;
//! use batch_get_loader::AttrMap;
//! use batch_get_loader::BatchingLoader;
//! use batch_get_loader::Key;
//! use batch_get_loader::LoadError;
//! use batch_get_loader::LookupRequest;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let mut item = AttrMap::new();
//!     item.insert("id".to_string(), "id1".into());
//!
//!     let store = MemoryStore::new()
//!         .with_item("table1", item.clone())
//!         .with_unprocessed("table2", Key::single("id", "id1"));
//!     let loader = BatchingLoader::new(store);
//!
//!     let found = loader.load(LookupRequest::new("table1", Key::single("id", "id1")));
//!     let missing = loader.load(LookupRequest::new("table1", Key::single("id", "id2")));
//!     let throttled = loader.load(LookupRequest::new("table2", Key::single("id", "id1")));
//!
//!     assert_eq!(Some(item), found.await.unwrap());
//!     assert_eq!(None, missing.await.unwrap());
//!     assert!(matches!(throttled.await, Err(LoadError::NotProcessed { .. })));
//!
//!     // All three lookups went out in one multi-get call.
//!     assert_eq!(1, loader.client().call_count());
//! }
//! ```

pub mod attr_value;
pub mod config;
pub mod errors;
pub mod impls;
pub mod key;
pub mod loader;
pub mod multi_get;
pub mod number;
pub mod partition;
pub mod result_index;

#[cfg(test)]
mod loader_scenarios_test;

pub use crate::attr_value::AttrMap;
pub use crate::attr_value::AttrValue;
pub use crate::attr_value::Record;
pub use crate::config::LoaderConfig;
pub use crate::config::DEFAULT_MAX_BATCH_SIZE;
pub use crate::errors::LoadError;
pub use crate::errors::ParseNumberError;
pub use crate::key::Key;
pub use crate::key::KeySchema;
pub use crate::key::LookupRequest;
pub use crate::loader::BatchingLoader;
pub use crate::loader::LoadResult;
pub use crate::loader::LoaderStats;
pub use crate::multi_get::MultiGet;
pub use crate::multi_get::MultiGetOutput;
pub use crate::multi_get::MultiGetRequest;
pub use crate::number::Number;
pub use crate::partition::partition;
pub use crate::partition::ChunkPolicy;
pub use crate::partition::DispatchPlan;
pub use crate::partition::Partition;
pub use crate::result_index::Outcome;
pub use crate::result_index::ResultIndex;
