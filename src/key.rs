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

//! Lookup keys and their equality.
//!
//! Equality of [`Key`] and [`LookupRequest`] is structural: same attribute names
//! with equal values, regardless of the order attributes were inserted in or how
//! numbers were spelled. The same `Eq` and `Hash` impls drive deduplication
//! before dispatch and matching of results after it.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::attr_value::AttrMap;
use crate::attr_value::AttrValue;
use crate::attr_value::Record;

/// The sorted attribute names of a key.
pub type KeySchema = Vec<String>;

/// Key attributes that identify one item within a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(AttrMap);

impl Key {
    pub fn new(attributes: AttrMap) -> Self {
        Self(attributes)
    }

    /// A key with a single attribute, e.g., a partition-key-only table.
    pub fn single(name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        Self::from_iter([(name.into(), value.into())])
    }

    pub fn attributes(&self) -> &AttrMap {
        &self.0
    }

    pub fn into_attributes(self) -> AttrMap {
        self.0
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the sorted attribute names of this key.
    pub fn schema(&self) -> KeySchema {
        self.0.keys().cloned().collect()
    }

    /// Extracts the key of `record` for the given attribute names.
    ///
    /// Returns `None` if the record lacks any of the attributes.
    pub fn project<R>(record: &R, schema: &[String]) -> Option<Self>
    where R: Record {
        let mut attributes = AttrMap::new();
        for name in schema {
            let value = record.attribute(name)?;
            attributes.insert(name.clone(), value.clone());
        }
        Some(Self(attributes))
    }

    /// Returns `true` if every attribute of this key is present in `record`
    /// with an equal value.
    ///
    /// Extra attributes of the record are ignored.
    pub fn matches<R>(&self, record: &R) -> bool
    where R: Record {
        self.0
            .iter()
            .all(|(name, value)| record.attribute(name) == Some(value))
    }
}

impl<N, V> FromIterator<(N, V)> for Key
where
    N: Into<String>,
    V: Into<AttrValue>,
{
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
        )
    }
}

impl From<AttrMap> for Key {
    fn from(value: AttrMap) -> Self {
        Self(value)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {:?}", name, value)?;
        }
        write!(f, "}}")
    }
}

/// A point lookup of one key in one collection.
///
/// Immutable once created. Two requests are equal iff both the collection names
/// and the keys are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize)]
pub struct LookupRequest {
    collection: String,
    key: Key,
}

impl LookupRequest {
    pub fn new(collection: impl Into<String>, key: impl Into<Key>) -> Self {
        Self {
            collection: collection.into(),
            key: key.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn into_parts(self) -> (String, Key) {
        (self.collection, self.key)
    }
}

impl fmt::Display for LookupRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.key)
    }
}
