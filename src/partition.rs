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

//! Splits the lookups of one dispatch cycle into multi-get calls.
//!
//! ```text
//! lookups ──dedup──> distinct ──group by collection──> groups
//!                                                        │
//!                               chunk to max_batch_size  │
//!                                                        v
//!                             partitions ──pack──> MultiGetRequest, ...
//! ```
//!
//! Every distinct key lands in exactly one partition; a partition never mixes
//! collections and never exceeds the cap.

use std::collections::HashMap;
use std::collections::HashSet;

use serde::Deserialize;
use serde::Serialize;

use crate::key::Key;
use crate::key::LookupRequest;
use crate::multi_get::MultiGetRequest;

/// How the batch size cap applies to a multi-get call spanning several collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize)]
pub enum ChunkPolicy {
    /// A call carries at most `max_batch_size` keys in total.
    ///
    /// Collections share a call while it has room, so a collection may be
    /// split across two calls where one fills up.
    #[default]
    Total,

    /// Each collection is capped independently.
    ///
    /// Call `i` carries the `i`-th chunk of every collection, so a call may
    /// hold up to `max_batch_size` keys per collection.
    PerCollection,
}

/// Keys of a single collection, at most `max_batch_size` of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub collection: String,
    pub keys: Vec<Key>,
}

/// The output of [`partition`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchPlan {
    /// Distinct lookups, in first-seen order.
    pub distinct: Vec<LookupRequest>,

    /// All partitions, in the order they were packed into calls.
    pub partitions: Vec<Partition>,

    /// The multi-get calls to issue. Their order carries no meaning.
    pub calls: Vec<MultiGetRequest>,
}

/// Removes structurally identical lookups, keeping the first of each.
pub fn dedup<'a>(requests: impl IntoIterator<Item = &'a LookupRequest>) -> Vec<LookupRequest> {
    let mut seen = HashSet::new();
    requests
        .into_iter()
        .filter(|r| seen.insert(*r))
        .cloned()
        .collect()
}

/// Groups keys by collection; groups and keys keep first-seen order.
fn group_by_collection(distinct: &[LookupRequest]) -> Vec<(String, Vec<Key>)> {
    let mut groups: Vec<(String, Vec<Key>)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for r in distinct {
        let i = *index.entry(r.collection()).or_insert_with(|| {
            groups.push((r.collection().to_string(), Vec::new()));
            groups.len() - 1
        });
        groups[i].1.push(r.key().clone());
    }

    groups
}

/// Builds the calls of one dispatch cycle.
///
/// An empty input produces an empty plan: no call should be made.
pub fn partition(
    requests: &[LookupRequest],
    max_batch_size: usize,
    policy: ChunkPolicy,
) -> DispatchPlan {
    let max = max_batch_size.max(1);
    let distinct = dedup(requests);
    let groups = group_by_collection(&distinct);

    let (partitions, calls) = match policy {
        ChunkPolicy::Total => pack_total(groups, max),
        ChunkPolicy::PerCollection => pack_per_collection(groups, max),
    };

    DispatchPlan {
        distinct,
        partitions,
        calls,
    }
}

fn pack_total(
    groups: Vec<(String, Vec<Key>)>,
    max: usize,
) -> (Vec<Partition>, Vec<MultiGetRequest>) {
    let mut partitions = Vec::new();
    let mut calls = Vec::new();
    let mut current = MultiGetRequest::new();

    for (collection, keys) in groups {
        let mut rest = keys.as_slice();

        while !rest.is_empty() {
            let room = max - current.len();
            let (head, tail) = rest.split_at(room.min(rest.len()));

            current.extend(&collection, head.iter().cloned());
            partitions.push(Partition {
                collection: collection.clone(),
                keys: head.to_vec(),
            });
            rest = tail;

            if current.len() == max {
                calls.push(std::mem::take(&mut current));
            }
        }
    }

    if !current.is_empty() {
        calls.push(current);
    }

    (partitions, calls)
}

fn pack_per_collection(
    groups: Vec<(String, Vec<Key>)>,
    max: usize,
) -> (Vec<Partition>, Vec<MultiGetRequest>) {
    let mut partitions = Vec::new();
    let mut calls: Vec<MultiGetRequest> = Vec::new();

    for (collection, keys) in groups {
        for (i, chunk) in keys.chunks(max).enumerate() {
            if calls.len() <= i {
                calls.push(MultiGetRequest::new());
            }
            calls[i].extend(&collection, chunk.iter().cloned());
            partitions.push(Partition {
                collection: collection.clone(),
                keys: chunk.to_vec(),
            });
        }
    }

    (partitions, calls)
}
