//! `taskmate tools`: print the tool specs the model is offered.

use std::sync::Arc;

use taskmate_store::InMemoryStore;

pub fn run() -> anyhow::Result<()> {
    // specs do not depend on the backend, so skip opening the real one
    let registry = taskmate_tools::default_registry(Arc::new(InMemoryStore::new()))?;
    println!("{}", serde_json::to_string_pretty(&registry.specs())?);
    Ok(())
}
