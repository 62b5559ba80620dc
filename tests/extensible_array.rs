//! End-to-end coverage of the extensible array over a real file-backed
//! cache: direct and indirect super-block addressing, fill-value reads,
//! persistence across a flush, and deletion (spec §4.2, §8 scenarios).

use std::sync::Arc;

use h5mdc::array::ea;
use h5mdc::cache::{Cache, ClassRegistry};
use h5mdc::config::{CacheConfig, EaCreateParams};
use h5mdc::store::{ByteStore, FileStore};

fn new_cache(path: &std::path::Path) -> Cache {
    let store: Arc<dyn ByteStore> = Arc::new(FileStore::create_new(path).unwrap());
    let mut classes = ClassRegistry::new();
    ea::register_classes(&mut classes);
    Cache::create(store, classes, CacheConfig::default(), None)
}

fn params() -> EaCreateParams {
    EaCreateParams {
        element_size: 4,
        max_nelmts_bits: 6,
        idx_blk_elmts: 4,
        sup_blk_min_data_ptrs: 4,
        data_blk_min_elmts: 4,
        max_dblk_page_bits: 0,
    }
}

fn elem(v: u32) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

#[test]
fn set_and_get_across_direct_and_indirect_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = new_cache(&dir.path().join("ea.dat"));
    let addr = ea::handle::create(&mut cache, params()).unwrap();
    let handle = ea::handle::open(&mut cache, addr).unwrap();

    // 0 is inline, 5/10/20 land in direct super blocks, 35 in the first
    // indirect super block (see DESIGN.md's worked sblk_info trace).
    for &i in &[0u64, 5, 10, 20, 35] {
        ea::handle::set(&mut cache, &handle, i, &elem(i as u32 * 10)).unwrap();
    }
    for &i in &[0u64, 5, 10, 20, 35] {
        assert_eq!(ea::handle::get(&mut cache, &handle, i).unwrap(), elem(i as u32 * 10));
    }

    // Never-set indices within range read back as zero fill.
    assert_eq!(ea::handle::get(&mut cache, &handle, 1).unwrap(), elem(0));
    assert_eq!(ea::handle::get(&mut cache, &handle, 21).unwrap(), elem(0));

    ea::handle::close(&mut cache, handle).unwrap();
}

#[test]
fn iterate_visits_every_set_index_up_to_max() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = new_cache(&dir.path().join("ea.dat"));
    let addr = ea::handle::create(&mut cache, params()).unwrap();
    let handle = ea::handle::open(&mut cache, addr).unwrap();

    ea::handle::set(&mut cache, &handle, 6, &elem(60)).unwrap();
    ea::handle::set(&mut cache, &handle, 2, &elem(20)).unwrap();

    let mut seen = Vec::new();
    ea::handle::iterate(&mut cache, &handle, |i, bytes| {
        seen.push((i, u32::from_le_bytes(bytes.try_into().unwrap())));
        Ok(true)
    })
    .unwrap();

    assert_eq!(seen.len(), 7); // max_idx_set == 7 (index 6 + 1)
    assert_eq!(seen[2], (2, 20));
    assert_eq!(seen[6], (6, 60));
    assert_eq!(seen[0], (0, 0));

    ea::handle::close(&mut cache, handle).unwrap();
}

#[test]
fn survives_a_flush_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ea.dat");
    let mut cache = new_cache(&path);
    let addr = ea::handle::create(&mut cache, params()).unwrap();
    let handle = ea::handle::open(&mut cache, addr).unwrap();
    ea::handle::set(&mut cache, &handle, 35, &elem(999)).unwrap();
    ea::handle::close(&mut cache, handle).unwrap();
    cache.flush(h5mdc::cache::FlushScope::All, true).unwrap();

    let handle = ea::handle::open(&mut cache, addr).unwrap();
    assert_eq!(ea::handle::get(&mut cache, &handle, 35).unwrap(), elem(999));
    ea::handle::close(&mut cache, handle).unwrap();
}

fn paged_params() -> EaCreateParams {
    EaCreateParams {
        element_size: 4,
        max_nelmts_bits: 8,
        idx_blk_elmts: 4,
        sup_blk_min_data_ptrs: 4,
        data_blk_min_elmts: 4,
        max_dblk_page_bits: 1,
    }
}

#[test]
fn paged_data_block_spans_multiple_pages_and_survives_a_flush() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ea.dat");
    let mut cache = new_cache(&path);
    let addr = ea::handle::create(&mut cache, paged_params()).unwrap();
    let handle = ea::handle::open(&mut cache, addr).unwrap();

    // idx_blk_elmts=4 puts 0..4 inline; the first direct super block's
    // data block (global 4..8) is paged two elements per page with
    // max_dblk_page_bits=1, so 4/5 land on page 0 and 6/7 on page 1 of
    // the same data block. Leaving 5 and 6 unset exercises a touched
    // page's fill-value element alongside a written neighbor.
    ea::handle::set(&mut cache, &handle, 4, &elem(400)).unwrap();
    ea::handle::set(&mut cache, &handle, 7, &elem(700)).unwrap();

    assert_eq!(ea::handle::get(&mut cache, &handle, 4).unwrap(), elem(400));
    assert_eq!(ea::handle::get(&mut cache, &handle, 5).unwrap(), elem(0));
    assert_eq!(ea::handle::get(&mut cache, &handle, 6).unwrap(), elem(0));
    assert_eq!(ea::handle::get(&mut cache, &handle, 7).unwrap(), elem(700));

    ea::handle::close(&mut cache, handle).unwrap();

    // A second array's header lands wherever the first array's data
    // block creation left the store's eoa. If that data block had
    // under-reserved its paged extent, this header would land inside
    // page 1's address range and clobber it on flush.
    let addr2 = ea::handle::create(&mut cache, paged_params()).unwrap();
    let handle2 = ea::handle::open(&mut cache, addr2).unwrap();
    ea::handle::set(&mut cache, &handle2, 4, &elem(4000)).unwrap();

    cache.flush(h5mdc::cache::FlushScope::All, true).unwrap();

    // Reopen against the same file: if the two pages' images had
    // overlapped on disk, page 0's trailing bytes (and page 1's
    // framing) would be clobbered and this would read back garbage
    // instead of 400/700.
    let handle = ea::handle::open(&mut cache, addr).unwrap();
    assert_eq!(ea::handle::get(&mut cache, &handle, 4).unwrap(), elem(400));
    assert_eq!(ea::handle::get(&mut cache, &handle, 5).unwrap(), elem(0));
    assert_eq!(ea::handle::get(&mut cache, &handle, 6).unwrap(), elem(0));
    assert_eq!(ea::handle::get(&mut cache, &handle, 7).unwrap(), elem(700));
    ea::handle::close(&mut cache, handle).unwrap();

    let handle2 = ea::handle::open(&mut cache, addr2).unwrap();
    assert_eq!(ea::handle::get(&mut cache, &handle2, 4).unwrap(), elem(4000));
    ea::handle::close(&mut cache, handle2).unwrap();
}

#[test]
fn delete_tears_down_every_block_and_flush_dep_edge() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = new_cache(&dir.path().join("ea.dat"));
    let addr = ea::handle::create(&mut cache, params()).unwrap();
    let handle = ea::handle::open(&mut cache, addr).unwrap();
    for &i in &[0u64, 5, 20, 35] {
        ea::handle::set(&mut cache, &handle, i, &elem(i as u32)).unwrap();
    }
    ea::handle::close(&mut cache, handle).unwrap();

    ea::handle::delete(&mut cache, addr).unwrap();
    assert!(cache.handle_for(addr).is_none());
}
