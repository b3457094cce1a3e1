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

//! Typed attribute values shared by lookup keys and stored items.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::number::Number;

/// Attributes by name.
///
/// A `BTreeMap` keeps attributes sorted by name, so two maps built in different
/// insertion orders compare and hash equal.
pub type AttrMap = BTreeMap<String, AttrValue>;

/// A single attribute value.
///
/// Serialized in the store's tagged style, e.g. `{"S":"id1"}` or `{"N":"42"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize)]
pub enum AttrValue {
    /// A UTF-8 string.
    S(String),
    /// A decimal number.
    N(Number),
    /// Raw bytes.
    B(Vec<u8>),
    #[serde(rename = "BOOL")]
    Bool(bool),
    #[serde(rename = "NULL")]
    Null,
    /// An ordered list of values.
    L(Vec<AttrValue>),
    /// A nested map of values.
    M(AttrMap),
}

impl AttrValue {
    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        AttrValue::B(bytes.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&Number> {
        match self {
            AttrValue::N(n) => Some(n),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::S(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::S(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<Number> for AttrValue {
    fn from(value: Number) -> Self {
        AttrValue::N(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::N(Number::from(value))
    }
}

impl From<u64> for AttrValue {
    fn from(value: u64) -> Self {
        AttrValue::N(Number::from(value))
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::N(Number::from(value))
    }
}

impl From<Vec<AttrValue>> for AttrValue {
    fn from(value: Vec<AttrValue>) -> Self {
        AttrValue::L(value)
    }
}

impl From<AttrMap> for AttrValue {
    fn from(value: AttrMap) -> Self {
        AttrValue::M(value)
    }
}

/// What the loader needs to know about a stored item.
///
/// Items returned by a multi-get call embed their own key attributes; the
/// loader reads them back to match each item with the lookup that asked for it.
/// Anything else about the item is opaque to the loader.
pub trait Record: Clone + Send + Sync + 'static {
    /// Returns the value of the named attribute, if the item has it.
    fn attribute(&self, name: &str) -> Option<&AttrValue>;
}

impl Record for AttrMap {
    fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.get(name)
    }
}
