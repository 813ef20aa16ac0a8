//! Cross-module scenario tests against the public `RegistryCore` API and the
//! in-memory `StoragePort` reference adapter.

use std::sync::Arc;

use tddb::config::TddbConfig;
use tddb::error::TddbError;
use tddb::parser::ReferenceParser;
use tddb::registry::{RegistryCore, SaveModuleInput};
use tddb::storage::MemoryStorage;

fn spec_for(module: &str, body: &str) -> String {
    format!("service acme {{ module {module} {{ {body} }} }}")
}

async fn fresh_registry() -> RegistryCore {
    let storage = Arc::new(MemoryStorage::new());
    let parser = Arc::new(ReferenceParser);
    RegistryCore::new(storage, parser, vec!["root".to_string()], TddbConfig::default())
}

async fn register(registry: &RegistryCore, module: &str, user: &str) {
    registry.request_module_registration(module, user).await.unwrap();
    registry
        .approve_module_registration_request("root", module)
        .await
        .unwrap();
}

#[tokio::test]
async fn scenario_register_new_module() {
    let registry = fresh_registry().await;
    register(&registry, "mod_a", "u1").await;

    let latest = registry.get_unreleased_latest("mod_a", "root").await.unwrap();
    assert!(latest.is_some());

    let owners = registry.get_owners("mod_a").await.unwrap();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].user_id, "u1");
    assert!(owners[0].with_change_owners_privilege);
}

/// Walks the full register -> initial save -> compatible change ->
/// incompatible pre-release change -> release -> incompatible change chain
/// as one continuous history, matching how these changes build on each
/// other in practice rather than as isolated before/after pairs.
#[tokio::test]
async fn scenario_full_version_history_chain() {
    let registry = fresh_registry().await;
    register(&registry, "mod_a", "u1").await;

    let mut v1 = SaveModuleInput::new(
        "mod_a",
        "u1",
        spec_for("mod_a", "typedef T = int;"),
    );
    v1.added_types.insert("T".to_string());
    let out = registry.save_module(v1).await.unwrap();
    let id = out.changes["T"].new_absolute_id.as_ref().unwrap();
    assert_eq!((id.major, id.minor), (0, 1));

    let v2 = SaveModuleInput::new(
        "mod_a",
        "u1",
        spec_for("mod_a", "typedef T = struct { x: int; y?: int; };"),
    );
    let out = registry.save_module(v2).await.unwrap();
    let id = out.changes["T"].new_absolute_id.as_ref().unwrap();
    assert_eq!((id.major, id.minor), (0, 2));

    let v3 = SaveModuleInput::new(
        "mod_a",
        "u1",
        spec_for("mod_a", "typedef T = struct { y?: int; };"),
    );
    let out = registry.save_module(v3).await.unwrap();
    let id = out.changes["T"].new_absolute_id.as_ref().unwrap();
    assert_eq!((id.major, id.minor), (0, 3));

    registry.release_module("mod_a", "u1").await.unwrap();

    let v4 = SaveModuleInput::new(
        "mod_a",
        "u1",
        spec_for("mod_a", "typedef T = struct { };"),
    );
    let out = registry.save_module(v4).await.unwrap();
    let id = out.changes["T"].new_absolute_id.as_ref().unwrap();
    assert_eq!((id.major, id.minor), (2, 0));
}

#[tokio::test]
async fn scenario_initial_type_save() {
    let registry = fresh_registry().await;
    register(&registry, "mod_a", "u1").await;

    let mut input = SaveModuleInput::new(
        "mod_a",
        "u1",
        spec_for("mod_a", "typedef T = int;"),
    );
    input.added_types.insert("T".to_string());
    let output = registry.save_module(input).await.unwrap();

    let change = output.changes.get("T").expect("T must be reported as changed");
    assert!(!change.unregistered);
    let id = change.new_absolute_id.as_ref().unwrap();
    assert_eq!(id.major, 0);
    assert_eq!(id.minor, 1);
    assert!(change.json_schema_doc.is_some());
}

#[tokio::test]
async fn scenario_backward_compatible_change_bumps_minor() {
    let registry = fresh_registry().await;
    register(&registry, "mod_a", "u1").await;

    let mut first = SaveModuleInput::new(
        "mod_a",
        "u1",
        spec_for("mod_a", "typedef T = struct { x: int; };"),
    );
    first.added_types.insert("T".to_string());
    registry.save_module(first).await.unwrap();

    let second = SaveModuleInput::new(
        "mod_a",
        "u1",
        spec_for(
            "mod_a",
            "typedef T = struct { x: int; y?: int; };",
        ),
    );
    let output = registry.save_module(second).await.unwrap();
    let id = output.changes["T"].new_absolute_id.as_ref().unwrap();
    assert_eq!((id.major, id.minor), (0, 2));
}

#[tokio::test]
async fn scenario_incompatible_change_pre_release_bumps_minor_only() {
    let registry = fresh_registry().await;
    register(&registry, "mod_a", "u1").await;

    let mut first = SaveModuleInput::new(
        "mod_a",
        "u1",
        spec_for("mod_a", "typedef T = struct { x: int; y?: int; };"),
    );
    first.added_types.insert("T".to_string());
    registry.save_module(first).await.unwrap();

    let second = SaveModuleInput::new(
        "mod_a",
        "u1",
        spec_for("mod_a", "typedef T = struct { x: int; };"),
    );
    let output = registry.save_module(second).await.unwrap();
    let id = output.changes["T"].new_absolute_id.as_ref().unwrap();
    assert_eq!((id.major, id.minor), (0, 2));
}

#[tokio::test]
async fn scenario_release_then_incompatible_bumps_major() {
    let registry = fresh_registry().await;
    register(&registry, "mod_a", "u1").await;

    let mut first = SaveModuleInput::new(
        "mod_a",
        "u1",
        spec_for("mod_a", "typedef T = struct { x: int; };"),
    );
    first.added_types.insert("T".to_string());
    registry.save_module(first).await.unwrap();

    registry.release_module("mod_a", "u1").await.unwrap();

    let second = SaveModuleInput::new(
        "mod_a",
        "u1",
        spec_for("mod_a", "typedef T = struct { };"),
    );
    let output = registry.save_module(second).await.unwrap();
    let id = output.changes["T"].new_absolute_id.as_ref().unwrap();
    assert_eq!((id.major, id.minor), (2, 0));
}

#[tokio::test]
async fn scenario_noop_save_fails_with_no_difference() {
    let registry = fresh_registry().await;
    register(&registry, "mod_a", "u1").await;

    let body = "typedef T = struct { x: int; };";
    let mut first = SaveModuleInput::new("mod_a", "u1", spec_for("mod_a", body));
    first.added_types.insert("T".to_string());
    registry.save_module(first).await.unwrap();

    let second = SaveModuleInput::new("mod_a", "u1", spec_for("mod_a", body));
    let err = registry.save_module(second).await.unwrap_err();
    assert!(matches!(err, TddbError::SpecParseError { .. }));
}

#[tokio::test]
async fn malformed_include_directive_is_rejected() {
    let registry = fresh_registry().await;
    register(&registry, "mod_a", "u1").await;

    let input = SaveModuleInput::new(
        "mod_a",
        "u1",
        format!("#include base\n{}", spec_for("mod_a", "typedef T = int;")),
    );
    let err = registry.save_module(input).await.unwrap_err();
    assert!(matches!(err, TddbError::SpecParseError { .. }));
}

#[tokio::test]
async fn non_owner_save_is_rejected() {
    let registry = fresh_registry().await;
    register(&registry, "mod_a", "u1").await;

    let input = SaveModuleInput::new(
        "mod_a",
        "mallory",
        spec_for("mod_a", "typedef T = int;"),
    );
    let err = registry.save_module(input).await.unwrap_err();
    assert!(matches!(err, TddbError::NoSuchPrivilege { .. }));
}

#[tokio::test]
async fn concurrent_modification_guard_rejects_stale_expectation() {
    let registry = fresh_registry().await;
    register(&registry, "mod_a", "u1").await;

    let mut input = SaveModuleInput::new(
        "mod_a",
        "u1",
        spec_for("mod_a", "typedef T = int;"),
    );
    input.expected_previous_version = Some(999);
    let err = registry.save_module(input).await.unwrap_err();
    assert!(matches!(err, TddbError::ConcurrentModification { .. }));
}

#[tokio::test]
async fn dependent_module_resolves_cross_module_reference() {
    let registry = fresh_registry().await;
    register(&registry, "base", "u1").await;
    register(&registry, "widget", "u1").await;

    let mut base_input = SaveModuleInput::new(
        "base",
        "u1",
        spec_for("base", "typedef Id = string;"),
    );
    base_input.added_types.insert("Id".to_string());
    registry.save_module(base_input).await.unwrap();

    let mut widget_input = SaveModuleInput::new(
        "widget",
        "u1",
        format!(
            "#include <base>\n{}",
            spec_for("widget", "typedef Gadget = base.Id;")
        ),
    );
    widget_input.added_types.insert("Gadget".to_string());
    let output = registry.save_module(widget_input).await.unwrap();
    assert!(output.changes.contains_key("Gadget"));
}

#[tokio::test]
async fn change_owners_owner_can_add_and_remove_co_owners() {
    let registry = fresh_registry().await;
    register(&registry, "mod_a", "u1").await;

    registry.add_owner("u1", "mod_a", "u2", false).await.unwrap();
    let owners = registry.get_owners("mod_a").await.unwrap();
    assert!(owners.iter().any(|o| o.user_id == "u2" && !o.with_change_owners_privilege));

    registry.remove_owner("u1", "mod_a", "u2").await.unwrap();
    let owners = registry.get_owners("mod_a").await.unwrap();
    assert!(!owners.iter().any(|o| o.user_id == "u2"));
}

#[tokio::test]
async fn plain_owner_cannot_mutate_owner_list() {
    let registry = fresh_registry().await;
    register(&registry, "mod_a", "u1").await;
    registry.add_owner("u1", "mod_a", "u2", false).await.unwrap();

    let err = registry.add_owner("u2", "mod_a", "u3", false).await.unwrap_err();
    assert!(matches!(err, TddbError::NoSuchPrivilege { .. }));
}
