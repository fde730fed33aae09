use grader_apis::{Implementation, SuiteConfig};
use std::{fs, os::unix::fs::PermissionsExt, path::Path};
use suite_loader::{Catalog, SuiteRegistry};

fn write_script(dir: &Path, name: &str, mode: u32) {
    let path = dir.join(name);
    fs::write(&path, "#!/bin/sh\necho '{\"success\": true}'\n").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
}

#[test]
fn resolves_builtin_and_executable_suites() {
    let tmp = tempfile::tempdir().unwrap();
    write_script(tmp.path(), "plugin.sh", 0o755);
    fs::write(tmp.path().join("required.txt"), "main.c\n").unwrap();

    let configs = vec![
        SuiteConfig::new("files", "required.txt", "RequiredFilesSuite"),
        SuiteConfig::new("plugin", "plugin.sh", "PluginSuite"),
    ];
    let registry = SuiteRegistry::resolve(&configs, tmp.path(), &Catalog::builtin());
    assert_eq!(registry.len(), 2);
    assert!(registry.rejected().is_empty());

    let base = tmp.path().canonicalize().unwrap();
    assert_eq!(
        registry.get("files"),
        Some(&Implementation::Builtin {
            class: "RequiredFilesSuite".to_string(),
            resource: base.join("required.txt"),
        })
    );
    assert_eq!(
        registry.get("plugin"),
        Some(&Implementation::Executable {
            program: base.join("plugin.sh"),
            class: "PluginSuite".to_string(),
        })
    );
}

#[test]
fn bad_entries_are_rejected_without_aborting_others() {
    let tmp = tempfile::tempdir().unwrap();
    write_script(tmp.path(), "not-exec.sh", 0o644);
    write_script(tmp.path(), "good.sh", 0o755);

    let configs = vec![
        SuiteConfig::new("missing", "nowhere.sh", "Whatever"),
        SuiteConfig::new("plain", "not-exec.sh", "UnknownClass"),
        SuiteConfig::new("good", "good.sh", "GoodSuite"),
    ];
    let registry = SuiteRegistry::resolve(&configs, tmp.path(), &Catalog::builtin());
    assert_eq!(registry.len(), 1);
    assert!(registry.get("good").is_some());
    assert!(registry
        .rejection("missing")
        .unwrap()
        .contains("implementation not found"));
    assert!(registry
        .rejection("plain")
        .unwrap()
        .contains("not a built-in suite class"));
}

#[test]
fn skipped_suites_never_appear() {
    let tmp = tempfile::tempdir().unwrap();
    let mut skipped = SuiteConfig::new("skipped", "does-not-even-exist", "StubSuite");
    skipped.skip = true;
    let registry = SuiteRegistry::resolve(&[skipped], tmp.path(), &Catalog::builtin());
    assert!(registry.is_empty());
    assert!(registry.get("skipped").is_none());
    assert!(registry.rejection("skipped").is_none());
}

#[test]
fn absolute_paths_are_used_as_is() {
    let tmp = tempfile::tempdir().unwrap();
    let other = tempfile::tempdir().unwrap();
    let abs = tmp.path().join("stub.txt");
    fs::write(&abs, "").unwrap();
    let config = SuiteConfig::new("stub", &abs, "StubSuite");
    let registry = SuiteRegistry::resolve(&[config], other.path(), &Catalog::builtin());
    assert!(registry.get("stub").is_some());
}
