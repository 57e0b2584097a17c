use std::sync::Arc;
use std::time::Duration;

use rehash_dict::Dict;
use rehash_dict::DictConfig;
use rehash_dict::DictError;
use rehash_dict::DictType;
use rehash_dict::HashKeys;
use rehash_dict::HashSeed;
use rehash_dict::HeapStringCopyKey;
use rehash_dict::HeapStringCopyKeyValue;
use rehash_dict::ReplaceOutcome;
use rehash_dict::ResizeOutcome;
use rehash_dict::SharedStr;
use rehash_dict::Value;
use rehash_dict::gen_case_hash;

fn s(text: &str) -> SharedStr {
    Arc::from(text)
}

#[test]
fn duplicate_insert_then_replace() {
    let mut dict: Dict<SharedStr, u32, _> = Dict::new(HeapStringCopyKey);
    dict.insert(s("a"), 1).unwrap();
    dict.insert(s("b"), 2).unwrap();
    assert_eq!(dict.insert(s("a"), 3), Err(DictError::KeyExists));
    assert_eq!(dict.find(&s("a")).and_then(|e| e.val()), Some(&1));
    assert_eq!(dict.replace(s("a"), 3), Ok(ReplaceOutcome::Replaced));
    assert_eq!(dict.find(&s("a")).and_then(|e| e.val()), Some(&3));
    assert_eq!(dict.len(), 2);
}

#[test]
fn thousand_keys_from_initial_size() {
    let config = DictConfig::default().with_initial_size(4).with_rng_seed(9);
    let mut dict: Dict<u64, u64, _> = Dict::with_config(HashKeys::new(), (), config);
    for k in 0..1000u64 {
        dict.insert(k, k).unwrap();
    }
    while dict.rehash(100) {}
    assert_eq!(dict.table_sizes()[0], 2000usize.next_power_of_two());
    assert_eq!(dict.len(), 1000);
    for k in 0..1000u64 {
        assert!(dict.find(&k).is_some(), "missing {k}");
    }
}

#[test]
fn safe_iterator_with_insert_mid_iteration() {
    let mut dict: Dict<u64, u64, _> = Dict::new(HashKeys::new());
    for k in 0..100u64 {
        dict.insert(k, k).unwrap();
    }
    let mut it = dict.safe_iterator();
    let mut seen = 0usize;
    let mut inserted = false;
    while dict.next_entry(&mut it).is_some() {
        seen += 1;
        if !inserted {
            dict.insert(1_000, 0).unwrap();
            inserted = true;
        }
    }
    assert_eq!(dict.release_iterator(it), Ok(()));
    assert!(seen == 100 || seen == 101, "saw {seen}");
    assert_eq!(dict.len(), 101);
}

#[test]
fn deferred_resize_replays_on_enable() {
    let config = DictConfig::default().with_resize_enabled(false);
    let mut dict: Dict<u64, (), _> = Dict::with_config(HashKeys::new(), (), config);
    for k in 0..16u64 {
        dict.insert(k, ()).unwrap();
    }
    assert!(!dict.resize_enabled());
    assert_eq!(dict.table_sizes(), [4, 0]);
    assert_eq!(dict.enable_resize(), Ok(ResizeOutcome::Resized));
    assert!(dict.rehash_for(Duration::from_secs(1)));
    assert_eq!(dict.table_sizes(), [32, 0]);

    dict.disable_resize();
    assert_eq!(dict.resize(), Ok(ResizeOutcome::Skipped));
    assert_eq!(dict.table_sizes(), [32, 0]);
}

#[test]
fn copy_key_value_preset_round_trip() {
    let mut dict = Dict::new(HeapStringCopyKeyValue);
    let key = s("user:1");
    let val = s("alice");
    dict.insert(key.clone(), val.clone()).unwrap();
    let entry = dict.find(&key).unwrap();
    assert_eq!(entry.val(), Some(&val));
    assert!(!Arc::ptr_eq(entry.key(), &key));
    assert!(!Arc::ptr_eq(entry.val().unwrap(), &val));
}

/// Case-insensitive command table, the classic use of a custom descriptor.
struct Commands;

impl DictType<String, u32> for Commands {
    type Context = ();

    fn hash(&self, seed: &HashSeed, key: &String) -> u64 {
        gen_case_hash(seed, key.as_bytes())
    }

    fn key_compare(&self, _ctx: &(), a: &String, b: &String) -> bool {
        a.eq_ignore_ascii_case(b)
    }
}

#[test]
fn case_insensitive_descriptor() {
    let mut dict = Dict::new(Commands);
    for (i, name) in ["get", "set", "del", "scan"].into_iter().enumerate() {
        dict.insert(name.to_string(), i as u32).unwrap();
    }
    assert_eq!(dict.fetch_value(&"SCAN".to_string()), Some(&Value::Ref(3)));
    assert_eq!(dict.insert("SeT".to_string(), 9), Err(DictError::KeyExists));
    dict.delete(&"DEL".to_string()).unwrap();
    assert_eq!(dict.len(), 3);
}

#[test]
fn inline_numeric_values() {
    let mut dict: Dict<u64, String, _> = Dict::new(HashKeys::new());
    dict.insert_or_find(1).unwrap().set_signed(-7);
    dict.insert_or_find(2).unwrap().set_double(0.25);
    *dict.insert_or_find(3).unwrap().value_mut() = Value::Unsigned(u64::MAX);
    assert_eq!(dict.find(&1).and_then(|e| e.signed()), Some(-7));
    assert_eq!(dict.find(&2).and_then(|e| e.double()), Some(0.25));
    assert_eq!(dict.find(&3).and_then(|e| e.unsigned()), Some(u64::MAX));
    assert_eq!(dict.find(&3).and_then(|e| e.val()), None);
}

#[test]
fn clear_callback_and_reuse() {
    let mut dict: Dict<u64, u64, _> = Dict::new(HashKeys::new());
    for k in 0..1000u64 {
        dict.insert(k, k).unwrap();
    }
    let mut calls = 0;
    dict.clear_with(|_ctx| calls += 1);
    assert!(calls >= 1);
    assert!(dict.is_empty());
    assert_eq!(dict.slots(), 0);
    dict.insert(5, 5).unwrap();
    assert_eq!(dict.table_sizes(), [4, 0]);
}
