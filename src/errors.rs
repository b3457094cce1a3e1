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

use std::io;
use std::sync::Arc;

use crate::key::Key;

/// Errors a caller of [`BatchingLoader::load`](crate::BatchingLoader::load) may observe.
///
/// A key that does not exist is not an error: it resolves to `Ok(None)`.
#[derive(Clone, Debug, thiserror::Error)]
pub enum LoadError {
    /// The store accepted the multi-get call but did not process this key,
    /// e.g., because it was throttled.
    ///
    /// The lookup may be retried by the caller; the loader never retries.
    #[error("The item was not processed")]
    NotProcessed { collection: String, key: Key },

    /// The multi-get call that carried this key failed as a whole.
    ///
    /// Every caller whose key was in the failed call shares the same error.
    #[error(transparent)]
    Transport(Arc<io::Error>),

    /// The dispatch cycle ended without resolving this lookup.
    #[error("the dispatch cycle ended before the lookup was resolved")]
    Canceled,
}

impl LoadError {
    /// Whether the same lookup issued again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LoadError::NotProcessed { .. })
    }

    /// The underlying store error, if the multi-get call failed.
    pub fn transport_error(&self) -> Option<&io::Error> {
        match self {
            LoadError::Transport(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Errors parsing a decimal [`Number`](crate::Number).
#[derive(Clone, PartialEq, Eq, thiserror::Error, Debug)]
pub enum ParseNumberError {
    #[error("invalid number: {0:?}")]
    Invalid(String),

    #[error("number out of range: {0:?}")]
    OutOfRange(String),

    #[error("number is not finite: {0}")]
    NonFinite(String),
}
