//! Local smoke test: registers a module, saves a type, and releases it,
//! logging each step. Not a CLI — just a runnable walkthrough of the
//! `RegistryCore` API for manual verification against a real subscriber.

use std::sync::Arc;

use tddb::parser::ReferenceParser;
use tddb::storage::MemoryStorage;
use tddb::{RegistryCore, SaveModuleInput, TddbConfig};

#[tokio::main]
async fn main() -> tddb::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let storage = Arc::new(MemoryStorage::new());
    let parser = Arc::new(ReferenceParser);
    let registry = RegistryCore::new(storage, parser, vec!["root".into()], TddbConfig::default());

    registry.request_module_registration("widget", "alice").await?;
    registry
        .approve_module_registration_request("root", "widget")
        .await?;

    let spec = "typedef Gadget = struct { id: string; };\nfuncdef describe(Gadget) -> (string);\n";
    let mut input = SaveModuleInput::new(
        "widget",
        "alice",
        format!("service acme {{ module widget {{ {spec} }} }}"),
    );
    input.added_types.insert("Gadget".to_string());
    let output = registry.save_module(input).await?;
    tracing::info!(changes = output.changes.len(), "save_module complete");

    registry.release_module("widget", "alice").await?;
    tracing::info!("widget released");
    Ok(())
}
