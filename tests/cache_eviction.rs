//! End-to-end coverage of the metadata cache's MSIC eviction policy
//! (spec §4.1.3, §8 scenario 1): LRU ordering, protected/pinned entries
//! never evicted, and dirty victims flushed before being detached.

use std::sync::Arc;

use h5mdc::cache::{
    Address, Body, Cache, CacheableClass, ClassRegistry, InsertFlags, ProtectFlags, Ring, UnprotectFlags, UserData,
};
use h5mdc::config::CacheConfig;
use h5mdc::store::{ByteStore, FileStore};

const DUMMY_CLASS: u32 = 9200;

/// A minimal cache class whose body is just a raw byte blob, for
/// driving `Cache` directly without any real array structure on top.
struct DummyClass;

impl CacheableClass for DummyClass {
    fn class_id(&self) -> u32 {
        DUMMY_CLASS
    }
    fn name(&self) -> &'static str {
        "dummy"
    }
    fn initial_image_size(&self, udata: UserData<'_>) -> usize {
        *udata.downcast_ref::<usize>().expect("dummy size context")
    }
    fn deserialize(&self, image: &[u8], _addr: Address, _udata: UserData<'_>) -> h5mdc::Result<Body> {
        Ok(Box::new(image.to_vec()))
    }
    fn image_size(&self, body: &Body) -> usize {
        body.downcast_ref::<Vec<u8>>().expect("dummy body").len()
    }
    fn serialize(&self, _addr: Address, body: &Body, buf: &mut Vec<u8>) -> h5mdc::Result<()> {
        let bytes = body.downcast_ref::<Vec<u8>>().expect("dummy body");
        buf.extend_from_slice(bytes);
        Ok(())
    }
}

fn new_cache(path: &std::path::Path, max_cache_size: usize, min_clean_size: usize) -> Cache {
    let store: Arc<dyn ByteStore> = Arc::new(FileStore::create_new(path).unwrap());
    let mut classes = ClassRegistry::new();
    classes.register(Arc::new(DummyClass));
    let config = CacheConfig { max_cache_size, min_clean_size, ring_count: 5, hash_buckets: 64, ..CacheConfig::default() };
    Cache::create(store, classes, config, None)
}

fn blob(n: usize, fill: u8) -> (Vec<u8>, usize) {
    let v = vec![fill; n];
    let size = v.len();
    (v, size)
}

#[test]
fn oversize_cache_evicts_oldest_entry_first() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = new_cache(&dir.path().join("c.dat"), 20, 0);

    let (a, sa) = blob(10, 1);
    let (b, sb) = blob(10, 2);
    let (c, sc) = blob(10, 3);
    let (d, sd) = blob(10, 4);

    let addr_a = Address::new(0);
    let addr_b = Address::new(16);
    let addr_c = Address::new(32);
    let addr_d = Address::new(48);

    cache.insert(addr_a, DUMMY_CLASS, Box::new(a), sa, 0 as Ring, InsertFlags::DIRTY).unwrap();
    cache.insert(addr_b, DUMMY_CLASS, Box::new(b), sb, 0 as Ring, InsertFlags::DIRTY).unwrap();
    // Pushes index_size past the 20-byte budget; the next insert's
    // `make_room_for` call is what notices and evicts.
    cache.insert(addr_c, DUMMY_CLASS, Box::new(c), sc, 0 as Ring, InsertFlags::DIRTY).unwrap();
    cache.insert(addr_d, DUMMY_CLASS, Box::new(d), sd, 0 as Ring, InsertFlags::DIRTY).unwrap();

    // A was the least-recently-used entry, so it's the eviction victim.
    assert!(cache.handle_for(addr_a).is_none());
    assert!(cache.handle_for(addr_b).is_some());
    assert!(cache.handle_for(addr_c).is_some());
    assert!(cache.handle_for(addr_d).is_some());
    cache.validate().unwrap();
}

#[test]
fn protected_entry_is_skipped_and_next_oldest_evicted_instead() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = new_cache(&dir.path().join("c.dat"), 20, 0);

    let (a, sa) = blob(10, 1);
    let (b, sb) = blob(10, 2);
    let (c, sc) = blob(10, 3);
    let (d, sd) = blob(10, 4);

    let addr_a = Address::new(0);
    let addr_b = Address::new(16);
    let addr_c = Address::new(32);
    let addr_d = Address::new(48);

    cache.insert(addr_a, DUMMY_CLASS, Box::new(a), sa, 0 as Ring, InsertFlags::DIRTY).unwrap();
    cache.insert(addr_b, DUMMY_CLASS, Box::new(b), sb, 0 as Ring, InsertFlags::DIRTY).unwrap();
    cache.insert(addr_c, DUMMY_CLASS, Box::new(c), sc, 0 as Ring, InsertFlags::DIRTY).unwrap();

    // A is the LRU victim, but protecting it for write must keep it out
    // of eviction's reach; B becomes the next candidate instead.
    let a_h = cache.protect(addr_a, DUMMY_CLASS, &sa, ProtectFlags::WRITE).unwrap();

    cache.insert(addr_d, DUMMY_CLASS, Box::new(d), sd, 0 as Ring, InsertFlags::DIRTY).unwrap();

    assert!(cache.handle_for(addr_a).is_some(), "protected entry must not be evicted");
    assert!(cache.handle_for(addr_b).is_none(), "next-oldest unprotected entry should be evicted instead");
    assert!(cache.handle_for(addr_c).is_some());
    assert!(cache.handle_for(addr_d).is_some());

    cache.unprotect(a_h, UnprotectFlags::empty()).unwrap();
    cache.validate().unwrap();
}

#[test]
fn pinned_entry_is_never_evicted() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = new_cache(&dir.path().join("c.dat"), 20, 0);

    let (a, sa) = blob(10, 1);
    let (b, sb) = blob(10, 2);
    let (c, sc) = blob(10, 3);
    let (d, sd) = blob(10, 4);

    let addr_a = Address::new(0);
    let addr_b = Address::new(16);
    let addr_c = Address::new(32);
    let addr_d = Address::new(48);

    let a_h = cache.insert(addr_a, DUMMY_CLASS, Box::new(a), sa, 0 as Ring, InsertFlags::DIRTY).unwrap();
    cache.pin(a_h).unwrap();
    cache.insert(addr_b, DUMMY_CLASS, Box::new(b), sb, 0 as Ring, InsertFlags::DIRTY).unwrap();
    cache.insert(addr_c, DUMMY_CLASS, Box::new(c), sc, 0 as Ring, InsertFlags::DIRTY).unwrap();
    cache.insert(addr_d, DUMMY_CLASS, Box::new(d), sd, 0 as Ring, InsertFlags::DIRTY).unwrap();

    assert!(cache.handle_for(addr_a).is_some(), "pinned entry must not be evicted");
    assert!(cache.handle_for(addr_b).is_none());
    cache.validate().unwrap();
}

#[test]
fn dirty_victim_is_flushed_to_the_store_before_eviction() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("c.dat");
    let mut cache = new_cache(&path, 20, 0);

    let (a, sa) = blob(10, 0xaa);
    let (b, sb) = blob(10, 0xbb);
    let (c, sc) = blob(10, 0xcc);

    let addr_a = Address::new(0);
    let addr_b = Address::new(16);
    let addr_c = Address::new(32);

    cache.insert(addr_a, DUMMY_CLASS, Box::new(a.clone()), sa, 0 as Ring, InsertFlags::DIRTY).unwrap();
    cache.insert(addr_b, DUMMY_CLASS, Box::new(b), sb, 0 as Ring, InsertFlags::DIRTY).unwrap();
    // Triggers eviction of `a`, which is still dirty and must be
    // serialized and written before being detached.
    cache.insert(addr_c, DUMMY_CLASS, Box::new(c), sc, 0 as Ring, InsertFlags::DIRTY).unwrap();

    assert!(cache.handle_for(addr_a).is_none());
    let on_disk = cache.store().read(addr_a.as_u64(), a.len() as u64).unwrap();
    assert_eq!(on_disk, a);
}
