use std::io;

use batch_get_loader::impls::memory::MemoryStore;
use batch_get_loader::AttrMap;
use batch_get_loader::BatchingLoader;
use batch_get_loader::Key;
use batch_get_loader::LoadError;
use batch_get_loader::LookupRequest;

fn user(id: &str, name: &str) -> AttrMap {
    let mut m = AttrMap::new();
    m.insert("id".to_string(), id.into());
    m.insert("name".to_string(), name.into());
    m
}

#[tokio::main]
async fn main() -> io::Result<()> {
    // Create an in-memory store with two users; "u3" will be reported as unprocessed
    let store = MemoryStore::new()
        .with_items("users", [user("u1", "alice"), user("u2", "bob")])
        .with_unprocessed("users", Key::single("id", "u3"));

    let loader = BatchingLoader::new(store);

    // Issue lookups concurrently; "u1" twice
    let lookups = ["u1", "u2", "u1", "u3", "u4"]
        .map(|id| LookupRequest::new("users", Key::single("id", id)));
    let results = loader.load_many(lookups.clone()).await;

    for (lookup, result) in lookups.iter().zip(results) {
        match result {
            Ok(Some(item)) => println!("{}: found {:?}", lookup, item),
            Ok(None) => println!("{}: not found", lookup),
            Err(e @ LoadError::NotProcessed { .. }) => println!("{}: retry later: {}", lookup, e),
            Err(LoadError::Transport(e)) => return Err(io::Error::new(e.kind(), e.to_string())),
            Err(e) => println!("{}: {}", lookup, e),
        }
    }

    // All five lookups were served by a single multi-get call with four distinct keys
    let stats = loader.stats();
    println!(
        "calls: {}, lookups: {}, distinct keys: {}",
        stats.calls, stats.lookups, stats.keys
    );

    Ok(())
}
