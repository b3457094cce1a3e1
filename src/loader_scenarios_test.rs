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

//! End-to-end behavior of [`BatchingLoader`] against scripted and in-memory stores.

use std::io;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Mutex;

use pretty_assertions::assert_eq;

use crate::impls::memory::MemoryStore;
use crate::AttrMap;
use crate::AttrValue;
use crate::BatchingLoader;
use crate::ChunkPolicy;
use crate::Key;
use crate::LoadError;
use crate::LoaderConfig;
use crate::LookupRequest;
use crate::MultiGet;
use crate::MultiGetOutput;
use crate::MultiGetRequest;
use crate::Number;

/// Returns the same scripted response to every call and records the calls.
#[derive(Clone)]
struct ScriptedStore {
    output: MultiGetOutput<AttrMap>,
    calls: Arc<Mutex<Vec<MultiGetRequest>>>,
}

impl ScriptedStore {
    fn new(output: MultiGetOutput<AttrMap>) -> Self {
        Self {
            output,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn calls(&self) -> Vec<MultiGetRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl MultiGet for ScriptedStore {
    type Item = AttrMap;

    async fn multi_get(
        &self,
        request: &MultiGetRequest,
    ) -> Result<MultiGetOutput<AttrMap>, io::Error> {
        self.calls.lock().unwrap().push(request.clone());
        Ok(self.output.clone())
    }
}

fn item(id: &str) -> AttrMap {
    let mut m = AttrMap::new();
    m.insert("id".to_string(), AttrValue::from(id));
    m
}

fn key(id: &str) -> Key {
    Key::single("id", id)
}

fn req(collection: &str, id: &str) -> LookupRequest {
    LookupRequest::new(collection, key(id))
}

fn assert_not_processed<T: std::fmt::Debug>(got: Result<T, LoadError>) {
    match got {
        Err(e @ LoadError::NotProcessed { .. }) => {
            assert_eq!("The item was not processed", e.to_string());
        }
        other => panic!("expect NotProcessed, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_uses_one_multi_get_for_two_keys() {
    let store =
        ScriptedStore::new(MultiGetOutput::new().with_found("table1", [item("id1"), item("id2")]));
    let loader = BatchingLoader::new(store.clone());

    let l1 = loader.load(req("table1", "id1"));
    let l2 = loader.load(req("table1", "id2"));
    let (got1, got2) = tokio::join!(l1, l2);

    assert_eq!(1, store.calls().len());
    assert_eq!(Some(item("id1")), got1.unwrap());
    assert_eq!(Some(item("id2")), got2.unwrap());
}

#[tokio::test]
async fn test_101_keys_take_two_calls() {
    let items: Vec<AttrMap> = (1..=101).map(|i| item(&format!("id{}", i))).collect();
    let store = ScriptedStore::new(MultiGetOutput::new().with_found("table1", items.clone()));
    let loader = BatchingLoader::new(store.clone());

    let got = loader
        .load_many((1..=101).map(|i| req("table1", &format!("id{}", i))))
        .await;

    let calls = store.calls();
    assert_eq!(2, calls.len());
    assert_eq!(100, calls[0].len());
    assert_eq!(1, calls[1].len());

    for (want, got) in items.into_iter().zip(got) {
        assert_eq!(Some(want), got.unwrap());
    }
}

#[tokio::test]
async fn test_multiple_tables_in_one_call() {
    let store = ScriptedStore::new(
        MultiGetOutput::new()
            .with_found("table1", [item("id1")])
            .with_found("table2", [item("id2")]),
    );
    let loader = BatchingLoader::new(store.clone());

    let (got1, got2) = tokio::join!(
        loader.load(req("table1", "id1")),
        loader.load(req("table2", "id2"))
    );

    assert_eq!(1, store.calls().len());
    assert_eq!(Some(item("id1")), got1.unwrap());
    assert_eq!(Some(item("id2")), got2.unwrap());
}

#[tokio::test]
async fn test_marks_unprocessed_keys_as_failures() {
    let store = ScriptedStore::new(
        MultiGetOutput::new()
            .with_found("table1", [item("id1")])
            .with_unprocessed("table2", [key("id2")]),
    );
    let loader = BatchingLoader::new(store.clone());

    let l1 = loader.load(req("table1", "id1"));
    let l2 = loader.load(req("table2", "id2"));

    assert_eq!(Some(item("id1")), l1.await.unwrap());
    assert_not_processed(l2.await);
    assert_eq!(1, store.calls().len());
}

#[tokio::test]
async fn test_same_key_found_in_one_table_unprocessed_in_another() {
    let store = ScriptedStore::new(
        MultiGetOutput::new()
            .with_found("table1", [item("k")])
            .with_unprocessed("table2", [key("k")]),
    );
    let loader = BatchingLoader::new(store.clone());

    let l1 = loader.load(req("table1", "k"));
    let l2 = loader.load(req("table2", "k"));

    assert_eq!(Some(item("k")), l1.await.unwrap());
    assert_not_processed(l2.await);

    let calls = store.calls();
    assert_eq!(1, calls.len());
    assert_eq!(&[key("k")], calls[0].keys("table1"));
    assert_eq!(&[key("k")], calls[0].keys("table2"));
}

#[tokio::test]
async fn test_response_with_only_unprocessed_keys() {
    let store = ScriptedStore::new(
        MultiGetOutput::new()
            .with_unprocessed("table2", [key("id2")])
            .with_unprocessed("table1", [key("id1")]),
    );
    let loader = BatchingLoader::new(store.clone());

    let l1 = loader.load(req("table1", "id1"));
    let l2 = loader.load(req("table2", "id2"));

    assert_not_processed(l1.await);
    assert_not_processed(l2.await);
    assert_eq!(1, store.calls().len());
}

#[tokio::test]
async fn test_found_unprocessed_and_missing_in_one_cycle() {
    let store = ScriptedStore::new(
        MultiGetOutput::new()
            .with_found("table1", [item("id1")])
            .with_unprocessed("table1", [key("id2")]),
    );
    let loader = BatchingLoader::new(store.clone());

    let l1 = loader.load(req("table1", "id1"));
    let l2 = loader.load(req("table1", "id2"));
    let l3 = loader.load(req("table2", "id3"));

    assert_eq!(Some(item("id1")), l1.await.unwrap());
    assert_not_processed(l2.await);
    assert_eq!(None, l3.await.unwrap());
    assert_eq!(1, store.calls().len());
}

#[tokio::test]
async fn test_unprocessed_and_missing_in_the_same_table() {
    let store = ScriptedStore::new(MultiGetOutput::new().with_unprocessed("table1", [key("id2")]));
    let loader = BatchingLoader::new(store.clone());

    let l1 = loader.load(req("table1", "id1"));
    let l2 = loader.load(req("table1", "id2"));

    assert_eq!(None, l1.await.unwrap());
    assert_not_processed(l2.await);
    assert_eq!(1, store.calls().len());
}

#[tokio::test]
async fn test_missing_key_resolves_to_none() {
    let store = ScriptedStore::new(MultiGetOutput::new().with_found("table1", [item("id1")]));
    let loader = BatchingLoader::new(store.clone());

    let (got1, got2) = tokio::join!(
        loader.load(req("table1", "id1")),
        loader.load(req("table1", "id2"))
    );

    assert_eq!(1, store.calls().len());
    assert_eq!(Some(item("id1")), got1.unwrap());
    assert_eq!(None, got2.unwrap());
}

#[tokio::test]
async fn test_empty_response_resolves_to_none() {
    let store = ScriptedStore::new(MultiGetOutput::new());
    let loader = BatchingLoader::new(store.clone());

    assert_eq!(None, loader.load(req("table1", "k")).await.unwrap());
    assert_eq!(1, store.calls().len());
}

#[tokio::test]
async fn test_duplicate_lookups_are_merged() {
    let store = ScriptedStore::new(MultiGetOutput::new().with_found("table1", [item("id1")]));
    let loader = BatchingLoader::new(store.clone());

    let (got1, got2) = tokio::join!(
        loader.load(req("table1", "id1")),
        loader.load(req("table1", "id1"))
    );

    assert_eq!(
        vec![MultiGetRequest::new().with_keys("table1", [key("id1")])],
        store.calls()
    );
    assert_eq!(Some(item("id1")), got1.unwrap());
    assert_eq!(Some(item("id1")), got2.unwrap());
}

#[tokio::test]
async fn test_structurally_identical_keys_are_merged() {
    let mut stored = AttrMap::new();
    stored.insert("pk".to_string(), AttrValue::from("p"));
    stored.insert("sk".to_string(), AttrValue::from(1));
    stored.insert("payload".to_string(), AttrValue::from("x"));

    let store = ScriptedStore::new(MultiGetOutput::new().with_found("t", [stored.clone()]));
    let loader = BatchingLoader::new(store.clone());

    let k1 = Key::from_iter([("pk", AttrValue::from("p")), ("sk", AttrValue::from(1))]);
    let k2 = Key::from_iter([
        ("sk", AttrValue::N("1.0".parse::<Number>().unwrap())),
        ("pk", AttrValue::from("p")),
    ]);

    let l1 = loader.load(LookupRequest::new("t", k1.clone()));
    let l2 = loader.load(LookupRequest::new("t", k2));

    assert_eq!(Some(stored.clone()), l1.await.unwrap());
    assert_eq!(Some(stored), l2.await.unwrap());

    let calls = store.calls();
    assert_eq!(1, calls.len());
    assert_eq!(&[k1], calls[0].keys("t"));
}

#[tokio::test]
async fn test_duplicate_callers_share_rejection() {
    let store = ScriptedStore::new(MultiGetOutput::new().with_unprocessed("table1", [key("id1")]));
    let loader = BatchingLoader::new(store.clone());

    let l1 = loader.load(req("table1", "id1"));
    let l2 = loader.load(req("table1", "id1"));

    assert_not_processed(l1.await);
    assert_not_processed(l2.await);
    assert_eq!(1, store.calls()[0].len());
}

#[tokio::test]
async fn test_transport_failure_fails_only_its_call() {
    let store = MemoryStore::new()
        .with_items("table1", [item("a"), item("b")])
        .with_item("table2", item("a"))
        .with_failing_collection("table2", io::ErrorKind::ConnectionReset, "connection reset");

    let config = LoaderConfig::default().with_max_batch_size(NonZeroUsize::new(2).unwrap());
    let loader = BatchingLoader::with_config(store, config);

    let la = loader.load(req("table1", "a"));
    let lb = loader.load(req("table1", "b"));
    let lfail1 = loader.load(req("table2", "a"));
    let lfail2 = loader.load(req("table2", "a"));

    assert_eq!(Some(item("a")), la.await.unwrap());
    assert_eq!(Some(item("b")), lb.await.unwrap());

    for got in [lfail1.await, lfail2.await] {
        let err = got.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(
            Some(io::ErrorKind::ConnectionReset),
            err.transport_error().map(|e| e.kind())
        );
        assert_eq!("connection reset", err.to_string());
    }

    assert_eq!(2, loader.client().call_count());

    let stats = loader.stats();
    assert_eq!(2, stats.calls);
    assert_eq!(1, stats.failed_calls);
}

#[tokio::test]
async fn test_total_policy_never_exceeds_cap_across_tables() {
    let store = MemoryStore::new()
        .with_items("table1", (0..60).map(|i| item(&format!("a{}", i))))
        .with_items("table2", (0..41).map(|i| item(&format!("b{}", i))));
    let loader = BatchingLoader::new(store);

    let mut requests: Vec<_> = (0..60).map(|i| req("table1", &format!("a{}", i))).collect();
    requests.extend((0..41).map(|i| req("table2", &format!("b{}", i))));

    let got = loader.load_many(requests).await;
    assert!(got.iter().all(|r| matches!(r, Ok(Some(_)))));

    let calls = loader.client().calls();
    assert_eq!(2, calls.len());
    assert_eq!(100, calls[0].len());
    assert_eq!(1, calls[1].len());
}

#[tokio::test]
async fn test_per_collection_policy() {
    let store = MemoryStore::new()
        .with_max_keys_per_call(None)
        .with_items("table1", (0..150).map(|i| item(&format!("a{}", i))))
        .with_items("table2", (0..50).map(|i| item(&format!("b{}", i))));

    let config = LoaderConfig::default().with_chunk_policy(ChunkPolicy::PerCollection);
    let loader = BatchingLoader::with_config(store, config);

    let mut requests: Vec<_> = (0..150).map(|i| req("table1", &format!("a{}", i))).collect();
    requests.extend((0..50).map(|i| req("table2", &format!("b{}", i))));

    let got = loader.load_many(requests.clone()).await;
    for (r, got) in requests.iter().zip(got) {
        assert_eq!(Some(item(r.key().get("id").and_then(|v| v.as_str()).unwrap())), got.unwrap());
    }

    let calls = loader.client().calls();
    assert_eq!(2, calls.len());
    assert_eq!(100, calls[0].keys("table1").len());
    assert_eq!(50, calls[0].keys("table2").len());
    assert_eq!(50, calls[1].keys("table1").len());
    assert!(calls[1].keys("table2").is_empty());
}

#[tokio::test]
async fn test_items_with_extra_attributes_match_their_keys() {
    let mut user = item("u1");
    user.insert("name".to_string(), AttrValue::from("alice"));
    user.insert("age".to_string(), AttrValue::from(30));

    let store = MemoryStore::new().with_item("users", user.clone());
    let loader = BatchingLoader::new(store);

    assert_eq!(Some(user), loader.load(req("users", "u1")).await.unwrap());
}
