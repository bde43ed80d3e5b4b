//! Store Tests
//!
//! Behaviour shared by the file-backed and in-memory stores.

use ringkv::storage::{FileStore, MemoryStore, PersistentStore};
use tempfile::tempdir;

fn exercise_basic_operations(store: &dyn PersistentStore) {
    assert!(!store.exists("a").unwrap());
    assert_eq!(store.read("a").unwrap(), None);

    store.write("a", "1").unwrap();
    assert!(store.exists("a").unwrap());
    assert_eq!(store.read("a").unwrap().as_deref(), Some("1"));

    store.write("a", "2").unwrap();
    assert_eq!(store.read("a").unwrap().as_deref(), Some("2"));

    assert!(store.delete("a").unwrap());
    assert!(!store.delete("a").unwrap());
    assert!(!store.exists("a").unwrap());
}

#[test]
fn test_memory_store_basic_operations() {
    exercise_basic_operations(&MemoryStore::new());
}

#[test]
fn test_file_store_basic_operations() {
    let dir = tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    exercise_basic_operations(&store);
}

#[test]
fn test_file_store_keys_with_special_characters() {
    let dir = tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();

    let keys = ["plain", "with space", "slash/inside", "back\\slash", "quote\"d", "tab\there"];
    for (i, key) in keys.iter().enumerate() {
        store.write(key, &format!("value {}", i)).unwrap();
    }

    for (i, key) in keys.iter().enumerate() {
        assert_eq!(store.read(key).unwrap(), Some(format!("value {}", i)), "{}", key);
    }

    let mut expected: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    expected.sort();
    assert_eq!(store.keys().unwrap(), expected);
}

#[test]
fn test_file_store_survives_reopen() {
    let dir = tempdir().unwrap();
    {
        let store = FileStore::open(dir.path()).unwrap();
        store.write("persisted", "yes").unwrap();
    }

    let store = FileStore::open(dir.path()).unwrap();
    assert_eq!(store.read("persisted").unwrap().as_deref(), Some("yes"));
}

#[test]
fn test_file_store_creates_missing_directory() {
    let dir = tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    let store = FileStore::open(&nested).unwrap();
    store.write("k", "v").unwrap();
    assert!(nested.is_dir());
}

#[test]
fn test_file_store_rejects_unstorable_keys() {
    let dir = tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    assert!(store.write("", "v").is_err());
    assert!(store.write("..", "v").is_err());
}

#[test]
fn test_clear_empties_store() {
    let dir = tempdir().unwrap();
    let file = FileStore::open(dir.path()).unwrap();
    let memory = MemoryStore::with_pairs([("x", "1"), ("y", "2")]);
    file.write("x", "1").unwrap();
    file.write("y", "2").unwrap();

    for store in [&file as &dyn PersistentStore, &memory] {
        assert_eq!(store.keys().unwrap().len(), 2);
        store.clear().unwrap();
        assert!(store.keys().unwrap().is_empty());
    }
}
