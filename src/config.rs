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

//! Loader configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::partition::ChunkPolicy;

/// The most keys a single multi-get call may carry by default.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Tunables of a [`BatchingLoader`](crate::BatchingLoader).
///
/// ```
/// use std::num::NonZeroUsize;
/// use std::time::Duration;
///
/// use batch_get_loader::ChunkPolicy;
/// use batch_get_loader::LoaderConfig;
///
/// let config = LoaderConfig::default()
///     .with_max_batch_size(NonZeroUsize::new(25).unwrap())
///     .with_chunk_policy(ChunkPolicy::PerCollection)
///     .with_batch_delay(Duration::from_millis(2));
///
/// assert_eq!(25, config.max_batch_size.get());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Cap on the number of keys in one multi-get call, see [`ChunkPolicy`].
    pub max_batch_size: NonZeroUsize,

    /// How the cap applies when one call carries several collections.
    pub chunk_policy: ChunkPolicy,

    /// Extra time an accumulation window stays open after the first lookup.
    ///
    /// `None` closes the window as soon as the task that opened it yields,
    /// which coalesces everything issued in the same scheduling turn.
    /// A delay widens the window for callers on other worker threads.
    pub batch_delay: Option<Duration>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_batch_size: NonZeroUsize::new(DEFAULT_MAX_BATCH_SIZE)
                .unwrap_or(NonZeroUsize::MIN),
            chunk_policy: ChunkPolicy::default(),
            batch_delay: None,
        }
    }
}

impl LoaderConfig {
    pub fn with_max_batch_size(mut self, max_batch_size: NonZeroUsize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    pub fn with_chunk_policy(mut self, chunk_policy: ChunkPolicy) -> Self {
        self.chunk_policy = chunk_policy;
        self
    }

    pub fn with_batch_delay(mut self, batch_delay: Duration) -> Self {
        self.batch_delay = Some(batch_delay);
        self
    }
}
