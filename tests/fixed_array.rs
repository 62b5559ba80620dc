//! End-to-end coverage of the fixed array: unpaged and paged data
//! blocks, fixed-bound rejection (invariant I9), and deletion (spec
//! §4.3, §8).

use std::sync::Arc;

use h5mdc::array::fa;
use h5mdc::cache::{Cache, ClassRegistry};
use h5mdc::config::{CacheConfig, FaCreateParams};
use h5mdc::store::{ByteStore, FileStore};

fn new_cache(path: &std::path::Path) -> Cache {
    let store: Arc<dyn ByteStore> = Arc::new(FileStore::create_new(path).unwrap());
    let mut classes = ClassRegistry::new();
    fa::register_classes(&mut classes);
    Cache::create(store, classes, CacheConfig::default(), None)
}

fn elem(v: u32) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

#[test]
fn unpaged_set_get_and_fill() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = new_cache(&dir.path().join("fa.dat"));
    let params = FaCreateParams { element_size: 4, max_dblk_page_bits: 0, nelmts: 16 };
    let addr = fa::handle::create(&mut cache, params).unwrap();
    let handle = fa::handle::open(&mut cache, addr).unwrap();

    fa::handle::set(&mut cache, &handle, 3, &elem(30)).unwrap();
    fa::handle::set(&mut cache, &handle, 10, &elem(100)).unwrap();

    assert_eq!(fa::handle::get(&mut cache, &handle, 3).unwrap(), elem(30));
    assert_eq!(fa::handle::get(&mut cache, &handle, 10).unwrap(), elem(100));
    assert_eq!(fa::handle::get(&mut cache, &handle, 0).unwrap(), elem(0));

    fa::handle::close(&mut cache, handle).unwrap();
}

#[test]
fn out_of_range_index_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = new_cache(&dir.path().join("fa.dat"));
    let params = FaCreateParams { element_size: 4, max_dblk_page_bits: 0, nelmts: 8 };
    let addr = fa::handle::create(&mut cache, params).unwrap();
    let handle = fa::handle::open(&mut cache, addr).unwrap();

    assert!(fa::handle::get(&mut cache, &handle, 8).is_err());
    assert!(fa::handle::set(&mut cache, &handle, 100, &elem(1)).is_err());

    fa::handle::close(&mut cache, handle).unwrap();
}

#[test]
fn paged_data_block_spans_multiple_pages() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = new_cache(&dir.path().join("fa.dat"));
    // 2 elements per page, 20 elements total -> 10 pages, several touched.
    let params = FaCreateParams { element_size: 4, max_dblk_page_bits: 1, nelmts: 20 };
    let addr = fa::handle::create(&mut cache, params).unwrap();
    let handle = fa::handle::open(&mut cache, addr).unwrap();

    for &i in &[0u64, 1, 5, 19] {
        fa::handle::set(&mut cache, &handle, i, &elem(i as u32 + 1)).unwrap();
    }
    for &i in &[0u64, 1, 5, 19] {
        assert_eq!(fa::handle::get(&mut cache, &handle, i).unwrap(), elem(i as u32 + 1));
    }
    assert_eq!(fa::handle::get(&mut cache, &handle, 18).unwrap(), elem(0));

    fa::handle::close(&mut cache, handle).unwrap();
}

#[test]
fn paged_data_block_survives_a_flush_with_every_page_touched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fa.dat");
    let mut cache = new_cache(&path);
    // 2 elements per page, 20 elements -> 10 pages; touch one element in
    // every page so each page image gets written to disk on flush. This
    // is what catches an overlapping page stride, which a single
    // never-flushed page cannot.
    let params = FaCreateParams { element_size: 4, max_dblk_page_bits: 1, nelmts: 20 };
    let addr = fa::handle::create(&mut cache, params).unwrap();
    let handle = fa::handle::open(&mut cache, addr).unwrap();

    for page in 0u64..10 {
        let i = page * 2;
        fa::handle::set(&mut cache, &handle, i, &elem(i as u32 + 1)).unwrap();
    }
    fa::handle::close(&mut cache, handle).unwrap();
    cache.flush(h5mdc::cache::FlushScope::All, true).unwrap();

    let handle = fa::handle::open(&mut cache, addr).unwrap();
    for page in 0u64..10 {
        let i = page * 2;
        assert_eq!(fa::handle::get(&mut cache, &handle, i).unwrap(), elem(i as u32 + 1));
        assert_eq!(fa::handle::get(&mut cache, &handle, i + 1).unwrap(), elem(0));
    }
    fa::handle::close(&mut cache, handle).unwrap();
}

#[test]
fn delete_detaches_header_data_block_and_pages() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = new_cache(&dir.path().join("fa.dat"));
    let params = FaCreateParams { element_size: 4, max_dblk_page_bits: 1, nelmts: 20 };
    let addr = fa::handle::create(&mut cache, params).unwrap();
    let handle = fa::handle::open(&mut cache, addr).unwrap();
    fa::handle::set(&mut cache, &handle, 5, &elem(5)).unwrap();
    fa::handle::close(&mut cache, handle).unwrap();

    fa::handle::delete(&mut cache, addr).unwrap();
    assert!(cache.handle_for(addr).is_none());
}
