//! Integration tests for id allocation and derived artifacts.
//!
//! These tests verify:
//! - Compiled ids are never replaced by dynamic allocation
//! - `R` classes follow compiled ids loaded from a symbol table file
//! - A package claimed by two scopes fails fast, and recovers once one goes away
//!
//! Run with: `cargo test --test ids_artifacts`

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use resview::artifacts::ArtifactError;
use resview::config::EngineConfig;
use resview::engine::ResourceEngine;
use resview::ids::{IdentifierAllocator, ResourceId, SymbolTable, DEFAULT_DYNAMIC_PACKAGE};
use resview::model::{RegistryKey, ResourceKey, ResourceNamespace, ResourceType};
use resview::repository::{FileLayoutParser, ResourceRepository};

// ============================================================================
// Helper Functions
// ============================================================================

fn res_dir(root: &Path, name: &str, lines: &str) -> PathBuf {
    let res = root.join(name);
    fs::create_dir_all(res.join("values")).unwrap();
    fs::write(res.join("values/strings.values"), lines).unwrap();
    res
}

fn symbol_table(entries: &[(&str, ResourceId)]) -> SymbolTable {
    let text: String = entries
        .iter()
        .map(|(name, id)| format!("int string {name} {id}\n"))
        .collect();
    SymbolTable::parse(&text, &ResourceNamespace::res_auto()).unwrap()
}

fn string_key(name: &str) -> ResourceKey {
    ResourceKey::res_auto(ResourceType::String, name)
}

fn engine() -> ResourceEngine {
    let mut config = EngineConfig::default();
    config.queue.workers = 2;
    ResourceEngine::start(config, Arc::new(FileLayoutParser)).unwrap()
}

// ============================================================================
// Identifier allocation
// ============================================================================

#[test]
fn test_compiled_ids_are_immutable() {
    let allocator = IdentifierAllocator::new();
    // The first slot dynamic allocation would hand out.
    let compiled = ResourceId::for_type(DEFAULT_DYNAMIC_PACKAGE, ResourceType::String, 0);
    allocator.reset_compiled(&symbol_table(&[("app_name", compiled)]));

    assert_eq!(allocator.dynamic_id(&string_key("app_name")).unwrap(), compiled);
    let other = allocator.dynamic_id(&string_key("other")).unwrap();
    assert_ne!(other, compiled);

    allocator.reset_dynamic();
    assert_eq!(allocator.compiled_id(&string_key("app_name")), Some(compiled));
    assert_eq!(allocator.resolve(compiled), Some(string_key("app_name")));
    assert_eq!(allocator.dynamic_count(), 0);
}

#[test]
fn test_dynamic_id_superseded_by_later_compile() {
    let allocator = IdentifierAllocator::new();
    let dynamic = allocator.dynamic_id(&string_key("title")).unwrap();
    assert_eq!(dynamic.package(), DEFAULT_DYNAMIC_PACKAGE);

    let compiled = ResourceId::from_raw(0x7f0e_0100);
    allocator.reset_compiled(&symbol_table(&[("title", compiled)]));

    assert_eq!(allocator.dynamic_id(&string_key("title")).unwrap(), compiled);
    assert_eq!(allocator.dynamic_count(), 0);
    assert_eq!(allocator.resolve(dynamic), None);
}

// ============================================================================
// Derived artifacts
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_r_class_follows_loaded_symbol_table() {
    let dir = TempDir::new().unwrap();
    let app = res_dir(dir.path(), "app", "string app_name = App\nstring title = Title\n");
    let engine = engine();
    let repo: Arc<dyn ResourceRepository> =
        engine.repository(&RegistryKey::flat(app)).await.unwrap();
    engine.register_class_generator("com.example", &repo);

    let r_txt = dir.path().join("R.txt");
    fs::write(&r_txt, "int string app_name 0x7f0e0001\n").unwrap();
    engine.load_compiled_ids(&SymbolTable::load(&r_txt, &ResourceNamespace::res_auto()).unwrap());

    let first = engine.generate("com.example.R").unwrap().unwrap();
    assert!(first.content.contains("public final class R"));
    assert!(first.content.contains("app_name = 0x7f0e0001"));
    assert!(first.content.contains("title = 0x"));

    // Unchanged inputs reuse the payload.
    let again = engine.generate("com.example.R").unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    fs::write(&r_txt, "int string app_name 0x7f0e0002\n").unwrap();
    engine.load_compiled_ids(&SymbolTable::load(&r_txt, &ResourceNamespace::res_auto()).unwrap());

    let rebuilt = engine.generate("com.example.R").unwrap().unwrap();
    assert!(rebuilt.content.contains("app_name = 0x7f0e0002"));
    let stats = engine.artifacts().stats();
    assert_eq!(stats.generated, 2);
    assert_eq!(stats.reused, 1);
    engine.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_package_collision_fails_fast_until_scope_drops() {
    let dir = TempDir::new().unwrap();
    let app = res_dir(dir.path(), "app", "string app_name = App\n");
    let engine = engine();
    let key = RegistryKey::flat(app);
    let leaf: Arc<dyn ResourceRepository> = engine.repository(&key).await.unwrap();
    let composite: Arc<dyn ResourceRepository> = engine
        .compose("preview", std::slice::from_ref(&key), &[], Vec::new())
        .await
        .unwrap();

    engine.register_class_generator("com.example", &leaf);
    engine.register_class_generator("com.example", &composite);

    match engine.generate("com.example.R") {
        Err(ArtifactError::Collision { key, scopes }) => {
            assert_eq!(key, "com.example.R");
            assert_eq!(scopes.len(), 2);
        }
        other => panic!("expected collision, got {other:?}"),
    }
    // Collisions are not cached as payloads.
    assert!(engine.generate("com.example.R").is_err());

    drop(composite);
    let payload = engine.generate("com.example.R").unwrap().unwrap();
    assert_eq!(payload.scope, leaf.id());
    assert!(engine.artifacts().stats().collisions >= 2);
    engine.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_package_and_foreign_keys_yield_nothing() {
    let dir = TempDir::new().unwrap();
    let app = res_dir(dir.path(), "app", "string app_name = App\n");
    let engine = engine();
    let repo: Arc<dyn ResourceRepository> =
        engine.repository(&RegistryKey::flat(app)).await.unwrap();
    engine.register_class_generator("com.example", &repo);

    assert!(engine.generate("com.other.R").unwrap().is_none());
    assert!(engine.generate("com.example.BuildConfig").unwrap().is_none());
    assert!(engine.generate("com.example.R$color").unwrap().is_none());
    assert!(engine.generate("com.example.R$string").unwrap().is_some());
    engine.shutdown();
}
