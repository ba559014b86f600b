use pretty_assertions::assert_eq;
use sourcekit_bsp_bazel::{cache_key, BazelTarget, CacheFile, TargetCache};
use std::collections::HashSet;
use tempfile::tempdir;

fn target(label: &str, id: u32) -> BazelTarget {
    BazelTarget {
        id,
        uri: BazelTarget::uri_for(label, id),
        label: label.to_string(),
        kind: "swift_library".to_string(),
        tags: Vec::new(),
        input_files: vec![format!("file:///ws/{label}/Foo.swift")],
        compiler_arguments: vec!["-module-name".to_string(), label.to_string()],
    }
}

#[test]
fn key_is_order_insensitive() {
    let forward = cache_key(&["//b:b".to_string(), "//a:a".to_string()]);
    let reverse = cache_key(&["//a:a".to_string(), "//b:b".to_string()]);
    assert_eq!(forward, "//a:a|//b:b");
    assert_eq!(forward, reverse);
}

#[test]
fn load_of_a_missing_file_is_none() {
    let dir = tempdir().unwrap();
    let cache = TargetCache::new(dir.path().join("cache.json"));
    assert_eq!(cache.load("//a:a"), None);
}

#[test]
fn save_then_load_round_trips_the_target_set() {
    let dir = tempdir().unwrap();
    let cache = TargetCache::new(dir.path().join("cache.json"));

    let targets = vec![target("//a:a", 1), target("//b:b", 2)];
    cache.save("//a:a|//b:b".to_string(), targets.clone());
    cache.flush();

    let loaded = cache.load("//a:a|//b:b").unwrap();
    let loaded: HashSet<_> = loaded.into_iter().collect();
    let expected: HashSet<_> = targets.into_iter().collect();
    assert_eq!(loaded, expected);
}

#[test]
fn save_replaces_only_its_own_entry() {
    let dir = tempdir().unwrap();
    let cache = TargetCache::new(dir.path().join("cache.json"));

    cache.save("//a:a".to_string(), vec![target("//a:a", 1)]);
    cache.save("//b:b".to_string(), vec![target("//b:b", 2)]);
    cache.save("//a:a".to_string(), vec![target("//a:a", 3)]);
    cache.flush();

    assert_eq!(cache.load("//a:a").unwrap()[0].id, 3);
    assert_eq!(cache.load("//b:b").unwrap()[0].id, 2);
}

#[test]
fn corrupt_cache_file_reads_as_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.json");
    std::fs::write(&path, "definitely not json").unwrap();

    let cache = TargetCache::new(path.clone());
    assert_eq!(cache.load("//a:a"), None);

    // A save through the same path replaces the corrupt file.
    cache.save("//a:a".to_string(), vec![target("//a:a", 1)]);
    cache.flush();
    assert_eq!(cache.load("//a:a").unwrap().len(), 1);
}

#[test]
fn cache_file_round_trips_by_value() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.json");

    let cache = TargetCache::new(path.clone());
    cache.save("//a:a".to_string(), vec![target("//a:a", 1)]);
    cache.flush();

    let on_disk = CacheFile::load(&path);
    let reparsed: CacheFile =
        serde_json::from_str(&serde_json::to_string_pretty(&on_disk).unwrap()).unwrap();
    assert_eq!(on_disk, reparsed);
    assert!(on_disk.entries.contains_key("//a:a"));
}

#[test]
fn creates_the_cache_directory_on_first_save() {
    let dir = tempdir().unwrap();
    let nested = dir.path().join(".bazel-sourcekit-bsp").join("cache.json");
    let cache = TargetCache::new(nested.clone());
    cache.save("//a:a".to_string(), vec![target("//a:a", 1)]);
    cache.flush();
    assert!(nested.is_file());
}
