//! Unit tests for catalog merging and registration.

use std::collections::BTreeMap;
use std::fs;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;

fn plugins(names: &[(&str, &str)]) -> BTreeMap<String, PluginMetadata> {
    names
        .iter()
        .map(|(name, root)| {
            (
                (*name).to_owned(),
                PluginMetadata::new(*name, format!("{root}/{name}.py")),
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

#[test]
fn custom_shadows_builtin_entirely() {
    let custom = plugins(&[("csv_", "/custom")]);
    let builtin = BTreeMap::from([(
        String::from("csv_"),
        PluginMetadata::new("csv_", "/builtin/csv_.py")
            .with_role(Some(PluginRole::Format))
            .with_matches(vec![String::from(".csv")]),
    )]);

    let catalog = PluginCatalog::merge(custom, builtin);
    let entry = catalog.entry("csv_").expect("csv_ present");

    assert_eq!(entry.origin(), PluginOrigin::Custom);
    assert_eq!(entry.metadata().path().to_str(), Some("/custom/csv_.py"));
    assert_eq!(entry.metadata().role(), None);
    assert!(entry.metadata().matches().is_empty());
}

#[test]
fn merge_keeps_both_sides_of_disjoint_sets() {
    let catalog = PluginCatalog::merge(
        plugins(&[("mine", "/custom")]),
        plugins(&[("json_", "/builtin"), ("yaml_", "/builtin")]),
    );

    let names: Vec<_> = catalog.iter().map(|entry| entry.metadata().name()).collect();
    assert_eq!(names, ["json_", "mine", "yaml_"]);
    assert_eq!(
        catalog.entry("json_").map(CatalogEntry::origin),
        Some(PluginOrigin::Builtin)
    );
}

// ---------------------------------------------------------------------------
// Resolve from disk
// ---------------------------------------------------------------------------

struct Dirs {
    root: TempDir,
}

impl Dirs {
    fn custom(&self) -> std::path::PathBuf {
        self.root.path().join("custom")
    }

    fn builtin(&self) -> std::path::PathBuf {
        self.root.path().join("builtin")
    }

    fn cache(&self) -> PluginCache {
        PluginCache::new(self.root.path().join("memo.json"))
    }
}

#[fixture]
fn dirs() -> Dirs {
    let dirs = Dirs {
        root: TempDir::new().expect("temp dir"),
    };
    for (dir, name) in [
        (dirs.custom(), "csv_.sh"),
        (dirs.builtin(), "csv_.sh"),
        (dirs.builtin(), "json_.sh"),
    ] {
        fs::create_dir_all(&dir).expect("create dir");
        fs::write(dir.join(name), "#!/bin/sh\n").expect("write plugin");
    }
    dirs
}

#[rstest]
fn fallback_enabled_merges_builtins(dirs: Dirs) {
    let catalog = PluginCatalog::resolve(
        &dirs.cache(),
        &dirs.custom(),
        Some(dirs.builtin().as_path()),
        true,
    )
    .expect("resolve");

    assert_eq!(catalog.len(), 2);
    assert_eq!(
        catalog.entry("csv_").map(CatalogEntry::origin),
        Some(PluginOrigin::Custom)
    );
    assert_eq!(
        catalog.entry("json_").map(CatalogEntry::origin),
        Some(PluginOrigin::Builtin)
    );
}

#[rstest]
fn fallback_disabled_ignores_builtins(dirs: Dirs) {
    let catalog = PluginCatalog::resolve(
        &dirs.cache(),
        &dirs.custom(),
        Some(dirs.builtin().as_path()),
        false,
    )
    .expect("resolve");

    assert_eq!(catalog.len(), 1);
    assert!(catalog.get("json_").is_none());
}

#[rstest]
fn missing_custom_directory_is_empty(dirs: Dirs) {
    let catalog = PluginCatalog::resolve(
        &dirs.cache(),
        &dirs.root.path().join("absent"),
        Some(dirs.builtin().as_path()),
        true,
    )
    .expect("resolve");

    assert_eq!(
        catalog.entry("csv_").map(CatalogEntry::origin),
        Some(PluginOrigin::Builtin)
    );
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

#[test]
fn register_rejects_collisions() {
    let mut catalog = PluginCatalog::merge(plugins(&[("csv_", "/custom")]), BTreeMap::new());

    let error = catalog
        .register(PluginMetadata::new("csv_", "/elsewhere/csv_"))
        .expect_err("duplicate should fail");

    assert!(matches!(error, PluginError::DuplicatePlugin { ref name } if name == "csv_"));
    assert!(error.is_configuration());
}

#[test]
fn register_adds_new_plugins() {
    let mut catalog = PluginCatalog::new();
    catalog
        .register(PluginMetadata::new("xlsx_", "/opt/xlsx_").with_role(Some(PluginRole::Format)))
        .expect("register");

    assert_eq!(
        catalog.entry("xlsx_").map(CatalogEntry::origin),
        Some(PluginOrigin::Registered)
    );
    assert_eq!(catalog.find_by_role(PluginRole::Format).len(), 1);
}

#[test]
fn register_rejects_blank_names() {
    let mut catalog = PluginCatalog::new();
    let error = catalog
        .register(PluginMetadata::new("  ", "/opt/blank"))
        .expect_err("blank name should fail");
    assert!(matches!(error, PluginError::InvalidEntry { .. }));
}
