//! End-to-end coverage of ring-ordered flush and flush-dependency
//! serialization order (spec §4.1.4, §4.1.5, §8 scenarios 2/3/6).

use std::sync::{Arc, Mutex};

use h5mdc::cache::{
    Address, Body, Cache, CacheableClass, ClassRegistry, FlushScope, InsertFlags, Ring, UserData,
};
use h5mdc::config::CacheConfig;
use h5mdc::store::{ByteStore, FileStore};

const PARENT_CLASS: u32 = 9301;
const CHILD_CLASS: u32 = 9302;

/// Records every address it serializes, in order, into a shared log so
/// a test can assert on relative flush ordering across two classes.
struct RecordingClass {
    class_id: u32,
    order: Arc<Mutex<Vec<Address>>>,
}

impl CacheableClass for RecordingClass {
    fn class_id(&self) -> u32 {
        self.class_id
    }
    fn name(&self) -> &'static str {
        "recording"
    }
    fn initial_image_size(&self, udata: UserData<'_>) -> usize {
        *udata.downcast_ref::<usize>().expect("recording size context")
    }
    fn deserialize(&self, image: &[u8], _addr: Address, _udata: UserData<'_>) -> h5mdc::Result<Body> {
        Ok(Box::new(image.to_vec()))
    }
    fn image_size(&self, body: &Body) -> usize {
        body.downcast_ref::<Vec<u8>>().expect("recording body").len()
    }
    fn serialize(&self, addr: Address, body: &Body, buf: &mut Vec<u8>) -> h5mdc::Result<()> {
        let bytes = body.downcast_ref::<Vec<u8>>().expect("recording body");
        buf.extend_from_slice(bytes);
        self.order.lock().unwrap().push(addr);
        Ok(())
    }
}

fn new_cache(path: &std::path::Path, order: Arc<Mutex<Vec<Address>>>) -> Cache {
    let store: Arc<dyn ByteStore> = Arc::new(FileStore::create_new(path).unwrap());
    let mut classes = ClassRegistry::new();
    classes.register(Arc::new(RecordingClass { class_id: PARENT_CLASS, order: order.clone() }));
    classes.register(Arc::new(RecordingClass { class_id: CHILD_CLASS, order }));
    Cache::create(store, classes, CacheConfig::default(), None)
}

#[test]
fn flush_serializes_a_dependent_child_before_its_parent() {
    let dir = tempfile::tempdir().unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut cache = new_cache(&dir.path().join("c.dat"), order.clone());

    // Parent address is numerically smaller than the child's, so an
    // address-ascending-only flush (ignoring the flush-dep edge) would
    // get the order wrong; this is what the ready-to-serialize check in
    // `flush_ring` guards against.
    let parent_addr = Address::new(0);
    let child_addr = Address::new(100);

    let parent_h = cache
        .insert(parent_addr, PARENT_CLASS, Box::new(vec![1u8; 8]), 8, 0 as Ring, InsertFlags::DIRTY)
        .unwrap();
    let child_h = cache
        .insert(child_addr, CHILD_CLASS, Box::new(vec![2u8; 8]), 8, 0 as Ring, InsertFlags::DIRTY)
        .unwrap();
    cache.flush_dep_create(parent_h, child_h).unwrap();

    cache.flush(FlushScope::All, true).unwrap();

    let seen = order.lock().unwrap().clone();
    let child_pos = seen.iter().position(|&a| a == child_addr).expect("child serialized");
    let parent_pos = seen.iter().position(|&a| a == parent_addr).expect("parent serialized");
    assert!(child_pos < parent_pos, "child must serialize before its flush-dep parent");
}

#[test]
fn flush_writes_every_dirty_entry_back_to_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("c.dat");
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut cache = new_cache(&path, order);

    let addr_a = Address::new(0);
    let addr_b = Address::new(8);
    let body_a = vec![7u8; 8];
    let body_b = vec![9u8; 8];

    cache.insert(addr_a, PARENT_CLASS, Box::new(body_a.clone()), 8, 0 as Ring, InsertFlags::DIRTY).unwrap();
    cache.insert(addr_b, CHILD_CLASS, Box::new(body_b.clone()), 8, 0 as Ring, InsertFlags::DIRTY).unwrap();

    cache.flush(FlushScope::All, false).unwrap();

    assert_eq!(cache.store().read(addr_a.as_u64(), 8).unwrap(), body_a);
    assert_eq!(cache.store().read(addr_b.as_u64(), 8).unwrap(), body_b);
    // `invalidate` was false: both entries are still resident, now clean.
    let a_h = cache.handle_for(addr_a).unwrap();
    assert!(!cache.entry(a_h).unwrap().is_dirty());
}

#[test]
fn ring_scope_only_flushes_entries_in_that_ring() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("c.dat");
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut cache = new_cache(&path, order);

    let addr_outer = Address::new(0);
    let addr_inner = Address::new(8);
    cache
        .insert(addr_outer, PARENT_CLASS, Box::new(vec![1u8; 8]), 8, h5mdc::cache::ring_named::USER, InsertFlags::DIRTY)
        .unwrap();
    cache
        .insert(addr_inner, CHILD_CLASS, Box::new(vec![2u8; 8]), 8, h5mdc::cache::ring_named::SB, InsertFlags::DIRTY)
        .unwrap();

    cache.flush(FlushScope::Ring(h5mdc::cache::ring_named::USER), false).unwrap();

    let outer_h = cache.handle_for(addr_outer).unwrap();
    let inner_h = cache.handle_for(addr_inner).unwrap();
    assert!(!cache.entry(outer_h).unwrap().is_dirty());
    assert!(cache.entry(inner_h).unwrap().is_dirty(), "entry outside the flushed ring stays dirty");
}

#[test]
fn swmr_write_config_is_carried_through_to_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn ByteStore> = Arc::new(FileStore::create_new(&dir.path().join("c.dat")).unwrap());
    let mut classes = ClassRegistry::new();
    classes.register(Arc::new(RecordingClass { class_id: PARENT_CLASS, order: Arc::new(Mutex::new(Vec::new())) }));
    let config = CacheConfig { swmr_write: true, ..CacheConfig::default() };
    let mut cache = Cache::create(store, classes, config, None);
    assert!(cache.swmr_write());

    // Even under SWMR, a plain flush still writes every dirty entry; the
    // metadata-only single-writer/multiple-reader discipline is the
    // owning file format's concurrency contract, not a different code
    // path through this flush.
    let addr = Address::new(0);
    cache.insert(addr, PARENT_CLASS, Box::new(vec![5u8; 4]), 4, 0 as Ring, InsertFlags::DIRTY).unwrap();
    cache.flush(FlushScope::All, false).unwrap();
    assert_eq!(cache.store().read(addr.as_u64(), 4).unwrap(), vec![5u8; 4]);
}
