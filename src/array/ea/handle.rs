//! The extensible-array public API: `create`/`open`/`get`/`set`/
//! `iterate`/`depend`/`close`/`delete`, wired entirely through the
//! metadata cache (spec §4.2.2).
//!
//! Every operation protects exactly the chain of blocks it needs,
//! mutating or allocating along the way, and unprotects before
//! returning. No block address is ever cached outside the cache's own
//! index; `EaHandle` holds nothing but the header's address.

use std::any::Any;

use crate::array::bump_alloc;
use crate::cache::{Address, Cache, CacheableClass, Handle, InsertFlags, ProtectFlags, Ring, UnprotectFlags};
use crate::cache::ring_named;
use crate::config::EaCreateParams;
use crate::format::class_id;
use crate::{Error, Result};

use super::data_block::EaDataBlock;
use super::header::{EaHeader, EaLayout};
use super::index_block::EaIndexBlock;
use super::page::{EaDataBlockPage, PageCtx};
use super::super_block::EaSuperBlock;

const EA_RING: Ring = ring_named::USER;

/// A handle to an open extensible array. Cheap to hold: it's just the
/// header's address, everything else is resolved through the cache on
/// each call.
#[derive(Debug, Clone, Copy)]
pub struct EaHandle {
    addr: Address,
}

impl EaHandle {
    pub fn header_addr(&self) -> Address {
        self.addr
    }
}

fn body_ref<T: Any>(cache: &Cache, h: Handle, what: &'static str) -> Result<&T> {
    cache
        .entry(h)?
        .body
        .as_ref()
        .and_then(|b| b.downcast_ref::<T>())
        .ok_or_else(|| Error::corrupt(what, "body missing or wrong type"))
}

fn body_mut<T: Any>(cache: &mut Cache, h: Handle, what: &'static str) -> Result<&mut T> {
    cache
        .entry_mut(h)?
        .body
        .as_mut()
        .and_then(|b| b.downcast_mut::<T>())
        .ok_or_else(|| Error::corrupt(what, "body missing or wrong type"))
}

/// `create(store, params, ctx) → addr` (spec §4.2.2): allocate the
/// header; the index block is created lazily on first `set`.
pub fn create(cache: &mut Cache, params: EaCreateParams) -> Result<Address> {
    params.validate()?;
    let class = cache
        .classes()
        .get(class_id::EA_HEADER)
        .ok_or_else(|| Error::corrupt("ea_header_class", "class not registered"))?;
    let size = class.initial_image_size(&());
    let addr = bump_alloc(&**cache.store(), size as u64)?;
    let header = EaHeader::new(params);
    cache.insert(addr, class_id::EA_HEADER, Box::new(header), size, EA_RING, InsertFlags::DIRTY)?;
    Ok(addr)
}

/// `open(store, addr, ctx) → Handle` (spec §4.2.2): protect the header,
/// bump its ref count, refuse if `pending_delete`.
pub fn open(cache: &mut Cache, addr: Address) -> Result<EaHandle> {
    let h = cache.protect(addr, class_id::EA_HEADER, &(), ProtectFlags::WRITE)?;
    let refused = body_ref::<EaHeader>(cache, h, "ea_header")?.pending_delete;
    if refused {
        cache.unprotect(h, UnprotectFlags::empty())?;
        return Err(Error::corrupt("ea_header", "cannot open: pending delete"));
    }
    body_mut::<EaHeader>(cache, h, "ea_header")?.ref_count += 1;
    // ref_count is in-core bookkeeping only (not part of the on-disk
    // image), so this mutation doesn't dirty the entry.
    cache.unprotect(h, UnprotectFlags::empty())?;
    Ok(EaHandle { addr })
}

/// `get(handle, i) → element` (spec §4.2.2): the class's fill value
/// (here, a zero-filled buffer — no fill-value class is wired to array
/// elements in this crate) if `i ≥ max_idx_set`, else the stored bytes.
pub fn get(cache: &mut Cache, handle: &EaHandle, i: u64) -> Result<Vec<u8>> {
    let h = cache.protect(handle.addr, class_id::EA_HEADER, &(), ProtectFlags::READ_ONLY)?;
    let (layout, idx_blk_elmts, index_block_addr, element_size, max_idx_set, loc) = {
        let hdr = body_ref::<EaHeader>(cache, h, "ea_header")?;
        let idx_blk_elmts = hdr.params.idx_blk_elmts as u64;
        let loc = if i >= idx_blk_elmts { Some(hdr.locate(i)?) } else { None };
        (hdr.layout(), idx_blk_elmts, hdr.index_block_addr, hdr.params.element_size, hdr.max_idx_set, loc)
    };
    cache.unprotect(h, UnprotectFlags::empty())?;
    let _ = idx_blk_elmts;

    let fill = vec![0u8; element_size as usize];
    if max_idx_set.map(|m| i >= m).unwrap_or(true) || !index_block_addr.is_defined() {
        return Ok(fill);
    }

    let ib_h = cache.protect(index_block_addr, class_id::EA_INDEX_BLOCK, &layout, ProtectFlags::READ_ONLY)?;

    let Some(loc) = loc else {
        let blk = body_ref::<EaIndexBlock>(cache, ib_h, "ea_index_block")?;
        let off = i as usize * element_size as usize;
        let out = blk.elmts[off..off + element_size as usize].to_vec();
        cache.unprotect(ib_h, UnprotectFlags::empty())?;
        return Ok(out);
    };

    let is_direct = loc.sblk < layout.nsblks;
    let addr_slot = {
        let blk = body_ref::<EaIndexBlock>(cache, ib_h, "ea_index_block")?;
        if is_direct {
            let base = blk.direct_slot_base(&layout, loc.sblk);
            blk.direct_dblk_addrs[base + loc.dblk_local as usize]
        } else {
            blk.sblk_addrs[loc.sblk - layout.nsblks]
        }
    };
    cache.unprotect(ib_h, UnprotectFlags::empty())?;

    if !addr_slot.is_defined() {
        return Ok(fill);
    }

    if is_direct {
        return read_data_block_element(cache, addr_slot, &layout, loc.sblk, loc.dblk_local, true, loc.elmt_in_dblk, element_size, None);
    }

    let sb_ctx = (layout.clone(), loc.sblk);
    let sb_h = cache.protect(addr_slot, class_id::EA_SUPER_BLOCK, &sb_ctx, ProtectFlags::READ_ONLY)?;
    let dblk_addr = body_ref::<EaSuperBlock>(cache, sb_h, "ea_super_block")?.dblk_addrs[loc.dblk_local as usize];
    if !dblk_addr.is_defined() {
        cache.unprotect(sb_h, UnprotectFlags::empty())?;
        return Ok(fill);
    }
    let out = read_data_block_element(cache, dblk_addr, &layout, loc.sblk, loc.dblk_local, false, loc.elmt_in_dblk, element_size, Some(sb_h))?;
    cache.unprotect(sb_h, UnprotectFlags::empty())?;
    Ok(out)
}

fn read_data_block_element(
    cache: &mut Cache,
    dblk_addr: Address,
    layout: &EaLayout,
    sblk: usize,
    dblk_local: u64,
    is_direct: bool,
    elmt_in_dblk: u64,
    element_size: u32,
    sb_h: Option<Handle>,
) -> Result<Vec<u8>> {
    let ctx = (layout.clone(), sblk, dblk_local, is_direct);
    let db_h = cache.protect(dblk_addr, class_id::EA_DATA_BLOCK, &ctx, ProtectFlags::READ_ONLY)?;
    let page_nelmts = body_ref::<EaDataBlock>(cache, db_h, "ea_data_block")?.page_nelmts;

    let Some(page_nelmts) = page_nelmts else {
        let blk = body_ref::<EaDataBlock>(cache, db_h, "ea_data_block")?;
        let off = elmt_in_dblk as usize * element_size as usize;
        let out = blk.elmts[off..off + element_size as usize].to_vec();
        cache.unprotect(db_h, UnprotectFlags::empty())?;
        return Ok(out);
    };

    let page = elmt_in_dblk / page_nelmts;
    let elmt_in_page = elmt_in_dblk % page_nelmts;

    let initialized = if is_direct {
        let blk = body_ref::<EaDataBlock>(cache, db_h, "ea_data_block")?;
        blk.own_page_bitmap.get(page as usize / 8).map(|b| b & (1 << (page % 8)) != 0).unwrap_or(false)
    } else {
        let n_pages = layout.sblk_info[sblk].dblk_nelmts / page_nelmts;
        let sb_h = sb_h.expect("indirect data block needs its owning super block for the page bitmap");
        body_ref::<EaSuperBlock>(cache, sb_h, "ea_super_block")?.page_initialized(dblk_local, page, n_pages)
    };

    if !initialized {
        cache.unprotect(db_h, UnprotectFlags::empty())?;
        return Ok(vec![0u8; element_size as usize]);
    }

    let page_addr = body_ref::<EaDataBlock>(cache, db_h, "ea_data_block")?.page_addr(dblk_addr, page);
    cache.unprotect(db_h, UnprotectFlags::empty())?;

    let page_ctx: PageCtx = (page_nelmts, element_size);
    let pg_h = cache.protect(page_addr, class_id::EA_DATA_BLOCK_PAGE, &page_ctx, ProtectFlags::READ_ONLY)?;
    let out = {
        let pg = body_ref::<EaDataBlockPage>(cache, pg_h, "ea_data_block_page")?;
        let off = elmt_in_page as usize * element_size as usize;
        pg.elmts[off..off + element_size as usize].to_vec()
    };
    cache.unprotect(pg_h, UnprotectFlags::empty())?;
    Ok(out)
}

/// `set(handle, i, element)` (spec §4.2.2): walk with r/w intent,
/// lazily creating any missing index block / super block / data block
/// / page, then mark the written entry dirty and update `max_idx_set`.
pub fn set(cache: &mut Cache, handle: &EaHandle, i: u64, element: &[u8]) -> Result<()> {
    let hh = cache.protect(handle.addr, class_id::EA_HEADER, &(), ProtectFlags::WRITE)?;

    let (layout, idx_blk_elmts, element_size, mut index_block_addr, max_idx_set) = {
        let hdr = body_ref::<EaHeader>(cache, hh, "ea_header")?;
        (hdr.layout(), hdr.params.idx_blk_elmts as u64, hdr.params.element_size, hdr.index_block_addr, hdr.max_idx_set)
    };

    if element.len() != element_size as usize {
        cache.unprotect(hh, UnprotectFlags::empty())?;
        return Err(Error::corrupt("element", "length does not match the array's configured element size"));
    }

    if !index_block_addr.is_defined() {
        let ib_class = cache
            .classes()
            .get(class_id::EA_INDEX_BLOCK)
            .ok_or_else(|| Error::corrupt("ea_index_block_class", "class not registered"))?;
        let size = ib_class.initial_image_size(&layout);
        let addr = bump_alloc(&**cache.store(), size as u64)?;
        let blk = EaIndexBlock::new(&layout);
        let ib_h = cache.insert(addr, class_id::EA_INDEX_BLOCK, Box::new(blk), size, EA_RING, InsertFlags::DIRTY)?;
        body_mut::<EaIndexBlock>(cache, ib_h, "ea_index_block")?.hdr_depend = true;
        cache.flush_dep_create(hh, ib_h)?;
        index_block_addr = addr;
        body_mut::<EaHeader>(cache, hh, "ea_header")?.index_block_addr = addr;
    }

    let loc = if i >= idx_blk_elmts {
        Some(body_ref::<EaHeader>(cache, hh, "ea_header")?.locate(i)?)
    } else {
        None
    };
    let grows_max = max_idx_set.map(|m| i >= m).unwrap_or(true);

    let ib_h = cache.protect(index_block_addr, class_id::EA_INDEX_BLOCK, &layout, ProtectFlags::WRITE)?;

    let Some(loc) = loc else {
        let blk = body_mut::<EaIndexBlock>(cache, ib_h, "ea_index_block")?;
        let slot = blk.elmt_slot(&layout, i);
        slot.copy_from_slice(element);
        cache.unprotect(ib_h, UnprotectFlags::DIRTIED)?;
        if grows_max {
            body_mut::<EaHeader>(cache, hh, "ea_header")?.max_idx_set = Some(i + 1);
        }
        cache.unprotect(hh, UnprotectFlags::DIRTIED)?;
        return Ok(());
    };

    let is_direct = loc.sblk < layout.nsblks;
    let mut ib_dirty = false;

    let mut sb_h: Option<Handle> = None;
    let mut sb_dirty = false;

    let dblk_addr = if is_direct {
        let base = body_ref::<EaIndexBlock>(cache, ib_h, "ea_index_block")?.direct_slot_base(&layout, loc.sblk);
        let slot = base + loc.dblk_local as usize;
        let existing = body_ref::<EaIndexBlock>(cache, ib_h, "ea_index_block")?.direct_dblk_addrs[slot];
        if existing.is_defined() {
            existing
        } else {
            let new_addr = create_data_block(cache, &layout, loc.sblk, loc.dblk_local, true)?;
            body_mut::<EaIndexBlock>(cache, ib_h, "ea_index_block")?.direct_dblk_addrs[slot] = new_addr;
            ib_dirty = true;
            if let Some(db_h) = cache.handle_for(new_addr) {
                body_mut::<EaDataBlock>(cache, db_h, "ea_data_block")?.hdr_depend = true;
                cache.flush_dep_create(hh, db_h)?;
            }
            new_addr
        }
    } else {
        let sblk_slot = loc.sblk - layout.nsblks;
        let existing_sb = body_ref::<EaIndexBlock>(cache, ib_h, "ea_index_block")?.sblk_addrs[sblk_slot];
        let sblk_addr = if existing_sb.is_defined() {
            existing_sb
        } else {
            let new_addr = create_super_block(cache, &layout, loc.sblk)?;
            body_mut::<EaIndexBlock>(cache, ib_h, "ea_index_block")?.sblk_addrs[sblk_slot] = new_addr;
            ib_dirty = true;
            if let Some(sbh) = cache.handle_for(new_addr) {
                body_mut::<EaSuperBlock>(cache, sbh, "ea_super_block")?.hdr_depend = true;
                cache.flush_dep_create(hh, sbh)?;
            }
            new_addr
        };

        let sb_ctx = (layout.clone(), loc.sblk);
        let h = cache.protect(sblk_addr, class_id::EA_SUPER_BLOCK, &sb_ctx, ProtectFlags::WRITE)?;
        let existing_db = body_ref::<EaSuperBlock>(cache, h, "ea_super_block")?.dblk_addrs[loc.dblk_local as usize];
        let db_addr = if existing_db.is_defined() {
            existing_db
        } else {
            let new_addr = create_data_block(cache, &layout, loc.sblk, loc.dblk_local, false)?;
            body_mut::<EaSuperBlock>(cache, h, "ea_super_block")?.dblk_addrs[loc.dblk_local as usize] = new_addr;
            sb_dirty = true;
            if let Some(db_h) = cache.handle_for(new_addr) {
                body_mut::<EaDataBlock>(cache, db_h, "ea_data_block")?.hdr_depend = true;
                cache.flush_dep_create(hh, db_h)?;
            }
            new_addr
        };
        sb_h = Some(h);
        db_addr
    };

    cache.unprotect(ib_h, if ib_dirty { UnprotectFlags::DIRTIED } else { UnprotectFlags::empty() })?;

    write_data_block_element(cache, hh, dblk_addr, &layout, loc.sblk, loc.dblk_local, is_direct, loc.elmt_in_dblk, element, sb_h.as_ref().map(|h| (*h, &mut sb_dirty)))?;

    if let Some(h) = sb_h {
        cache.unprotect(h, if sb_dirty { UnprotectFlags::DIRTIED } else { UnprotectFlags::empty() })?;
    }

    if grows_max {
        body_mut::<EaHeader>(cache, hh, "ea_header")?.max_idx_set = Some(i + 1);
    }
    cache.unprotect(hh, UnprotectFlags::DIRTIED)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn write_data_block_element(
    cache: &mut Cache,
    hh: Handle,
    dblk_addr: Address,
    layout: &EaLayout,
    sblk: usize,
    dblk_local: u64,
    is_direct: bool,
    elmt_in_dblk: u64,
    element: &[u8],
    mut sb: Option<(Handle, &mut bool)>,
) -> Result<()> {
    let ctx = (layout.clone(), sblk, dblk_local, is_direct);
    let db_h = cache.protect(dblk_addr, class_id::EA_DATA_BLOCK, &ctx, ProtectFlags::WRITE)?;
    let page_nelmts = body_ref::<EaDataBlock>(cache, db_h, "ea_data_block")?.page_nelmts;

    let Some(page_nelmts) = page_nelmts else {
        let blk = body_mut::<EaDataBlock>(cache, db_h, "ea_data_block")?;
        let element_size = element.len();
        let off = elmt_in_dblk as usize * element_size;
        blk.elmts[off..off + element_size].copy_from_slice(element);
        cache.unprotect(db_h, UnprotectFlags::DIRTIED)?;
        return Ok(());
    };

    let page = elmt_in_dblk / page_nelmts;
    let elmt_in_page = elmt_in_dblk % page_nelmts;
    let n_pages = layout.sblk_info[sblk].dblk_nelmts / page_nelmts;

    let mut db_dirty = false;
    let already_initialized = if is_direct {
        body_ref::<EaDataBlock>(cache, db_h, "ea_data_block")?
            .own_page_bitmap
            .get(page as usize / 8)
            .map(|b| b & (1 << (page % 8)) != 0)
            .unwrap_or(false)
    } else {
        let (sb_h, _) = sb.as_ref().expect("indirect data block needs its owning super block");
        body_ref::<EaSuperBlock>(cache, *sb_h, "ea_super_block")?.page_initialized(dblk_local, page, n_pages)
    };

    let page_addr = body_ref::<EaDataBlock>(cache, db_h, "ea_data_block")?.page_addr(dblk_addr, page);

    if !already_initialized {
        if is_direct {
            let blk = body_mut::<EaDataBlock>(cache, db_h, "ea_data_block")?;
            let bit = page as usize;
            blk.own_page_bitmap[bit / 8] |= 1 << (bit % 8);
            db_dirty = true;
        } else {
            let (sb_h, sb_dirty) = sb.as_mut().expect("indirect data block needs its owning super block");
            body_mut::<EaSuperBlock>(cache, *sb_h, "ea_super_block")?.set_page_initialized(dblk_local, page, n_pages);
            **sb_dirty = true;
        }
        let page_ctx: PageCtx = (page_nelmts, layout.element_size);
        let page_body = EaDataBlockPage::new(&page_ctx);
        let class = cache
            .classes()
            .get(class_id::EA_DATA_BLOCK_PAGE)
            .ok_or_else(|| Error::corrupt("ea_data_block_page_class", "class not registered"))?;
        let size = class.initial_image_size(&page_ctx);
        cache.insert(page_addr, class_id::EA_DATA_BLOCK_PAGE, Box::new(page_body), size, EA_RING, InsertFlags::DIRTY)?;
        if let Some(pg_h) = cache.handle_for(page_addr) {
            body_mut::<EaDataBlockPage>(cache, pg_h, "ea_data_block_page")?.hdr_depend = true;
            cache.flush_dep_create(hh, pg_h)?;
        }
    }

    cache.unprotect(db_h, if db_dirty { UnprotectFlags::DIRTIED } else { UnprotectFlags::empty() })?;

    let page_ctx: PageCtx = (page_nelmts, layout.element_size);
    let pg_h = cache.protect(page_addr, class_id::EA_DATA_BLOCK_PAGE, &page_ctx, ProtectFlags::WRITE)?;
    {
        let pg = body_mut::<EaDataBlockPage>(cache, pg_h, "ea_data_block_page")?;
        let element_size = element.len();
        let off = elmt_in_page as usize * element_size;
        pg.elmts[off..off + element_size].copy_from_slice(element);
    }
    cache.unprotect(pg_h, UnprotectFlags::DIRTIED)?;
    Ok(())
}

fn create_data_block(cache: &mut Cache, layout: &EaLayout, sblk: usize, dblk_local: u64, is_direct: bool) -> Result<Address> {
    let ctx = (layout.clone(), sblk, dblk_local, is_direct);
    let class = cache
        .classes()
        .get(class_id::EA_DATA_BLOCK)
        .ok_or_else(|| Error::corrupt("ea_data_block_class", "class not registered"))?;
    let size = class.initial_image_size(&ctx);
    let blk = EaDataBlock::new(layout, sblk, dblk_local, is_direct);
    // A paged block's reserved extent covers its header plus every
    // page, since pages are placed arithmetically right after it
    // rather than bump-allocated on their own.
    let addr = bump_alloc(&**cache.store(), blk.reserved_extent() as u64)?;
    cache.insert(addr, class_id::EA_DATA_BLOCK, Box::new(blk), size, EA_RING, InsertFlags::DIRTY)?;
    Ok(addr)
}

fn create_super_block(cache: &mut Cache, layout: &EaLayout, sblk: usize) -> Result<Address> {
    let ctx = (layout.clone(), sblk);
    let class = cache
        .classes()
        .get(class_id::EA_SUPER_BLOCK)
        .ok_or_else(|| Error::corrupt("ea_super_block_class", "class not registered"))?;
    let size = class.initial_image_size(&ctx);
    let addr = bump_alloc(&**cache.store(), size as u64)?;
    let blk = EaSuperBlock::new(layout, sblk);
    cache.insert(addr, class_id::EA_SUPER_BLOCK, Box::new(blk), size, EA_RING, InsertFlags::DIRTY)?;
    Ok(addr)
}

/// `iterate(handle, op, udata) → ()` (spec §4.2.2): visit every index in
/// `[0, max_idx_set)` in increasing order; `op` returning `false` stops
/// the scan early. The spec's `udata` context is this closure's capture.
pub fn iterate<F>(cache: &mut Cache, handle: &EaHandle, mut op: F) -> Result<()>
where
    F: FnMut(u64, &[u8]) -> Result<bool>,
{
    let h = cache.protect(handle.addr, class_id::EA_HEADER, &(), ProtectFlags::READ_ONLY)?;
    let max_idx_set = body_ref::<EaHeader>(cache, h, "ea_header")?.max_idx_set;
    cache.unprotect(h, UnprotectFlags::empty())?;

    let Some(max_idx_set) = max_idx_set else { return Ok(()) };
    for i in 0..max_idx_set {
        let element = get(cache, handle, i)?;
        if !op(i, &element)? {
            break;
        }
    }
    Ok(())
}

/// `depend(handle, external_parent_proxy)` (spec §4.2.2): ties the EA
/// header into a parent proxy owned by the client (e.g. the owning
/// object's top-proxy).
pub fn depend(cache: &mut Cache, handle: &EaHandle, external_parent_proxy: Handle) -> Result<()> {
    let header_handle = cache.handle_for(handle.addr).ok_or(Error::NotFound(handle.addr))?;
    cache.flush_dep_create(external_parent_proxy, header_handle)
}

/// `close(handle)` (spec §4.2.2): decrement the ref count; on last
/// close, if `pending_delete` is set, delete the whole structure.
pub fn close(cache: &mut Cache, handle: EaHandle) -> Result<()> {
    let h = cache.protect(handle.addr, class_id::EA_HEADER, &(), ProtectFlags::WRITE)?;
    let should_delete = {
        let hdr = body_mut::<EaHeader>(cache, h, "ea_header")?;
        hdr.ref_count = hdr.ref_count.saturating_sub(1);
        hdr.ref_count == 0 && hdr.pending_delete
    };
    cache.unprotect(h, UnprotectFlags::empty())?;
    if should_delete {
        delete(cache, handle.addr)?;
    }
    Ok(())
}

/// `delete(store, addr, ctx)` (spec §4.2.2): recursive release of every
/// allocated block. Byte-space reclamation is left to the owning file
/// format's free-space manager (see `array::bump_alloc`); this only
/// detaches every block from the cache and tears down the flush-dep
/// edges this crate created for it.
pub fn delete(cache: &mut Cache, addr: Address) -> Result<()> {
    let h = cache.protect(addr, class_id::EA_HEADER, &(), ProtectFlags::WRITE)?;
    let (layout, index_block_addr) = {
        let hdr = body_ref::<EaHeader>(cache, h, "ea_header")?;
        (hdr.layout(), hdr.index_block_addr)
    };
    cache.unprotect(h, UnprotectFlags::empty())?;

    if index_block_addr.is_defined() {
        delete_index_block(cache, addr, index_block_addr, &layout)?;
    }

    let hh = cache.handle_for(addr).ok_or(Error::NotFound(addr))?;
    cache.expunge(hh, None)?;
    Ok(())
}

fn teardown_hdr_depend(cache: &mut Cache, header_addr: Address, child: Handle, had_depend: bool) -> Result<()> {
    if !had_depend {
        return Ok(());
    }
    if let Some(header_handle) = cache.handle_for(header_addr) {
        cache.flush_dep_destroy(header_handle, child)?;
    }
    Ok(())
}

fn delete_index_block(cache: &mut Cache, header_addr: Address, addr: Address, layout: &EaLayout) -> Result<()> {
    let h = cache.protect(addr, class_id::EA_INDEX_BLOCK, layout, ProtectFlags::WRITE)?;
    let (direct_addrs, sblk_addrs, had_depend) = {
        let blk = body_ref::<EaIndexBlock>(cache, h, "ea_index_block")?;
        (blk.direct_dblk_addrs.clone(), blk.sblk_addrs.clone(), blk.hdr_depend)
    };
    cache.unprotect(h, UnprotectFlags::empty())?;

    let mut slot = 0usize;
    for sblk in 0..layout.nsblks {
        let n = layout.sblk_info[sblk].n_dblks as usize;
        for local in 0..n {
            let da = direct_addrs[slot];
            slot += 1;
            if da.is_defined() {
                delete_data_block(cache, header_addr, da, layout, sblk, local as u64, true)?;
            }
        }
    }
    for (i, sa) in sblk_addrs.iter().enumerate() {
        if sa.is_defined() {
            delete_super_block(cache, header_addr, *sa, layout, layout.nsblks + i)?;
        }
    }

    let hh = cache.handle_for(addr).ok_or(Error::NotFound(addr))?;
    teardown_hdr_depend(cache, header_addr, hh, had_depend)?;
    cache.expunge(hh, None)?;
    Ok(())
}

fn delete_super_block(cache: &mut Cache, header_addr: Address, addr: Address, layout: &EaLayout, sblk: usize) -> Result<()> {
    let ctx = (layout.clone(), sblk);
    let h = cache.protect(addr, class_id::EA_SUPER_BLOCK, &ctx, ProtectFlags::WRITE)?;
    let (dblk_addrs, had_depend) = {
        let blk = body_ref::<EaSuperBlock>(cache, h, "ea_super_block")?;
        (blk.dblk_addrs.clone(), blk.hdr_depend)
    };
    cache.unprotect(h, UnprotectFlags::empty())?;

    for (local, da) in dblk_addrs.iter().enumerate() {
        if da.is_defined() {
            delete_data_block(cache, header_addr, *da, layout, sblk, local as u64, false)?;
        }
    }

    let hh = cache.handle_for(addr).ok_or(Error::NotFound(addr))?;
    teardown_hdr_depend(cache, header_addr, hh, had_depend)?;
    cache.expunge(hh, None)?;
    Ok(())
}

fn delete_data_block(
    cache: &mut Cache,
    header_addr: Address,
    addr: Address,
    layout: &EaLayout,
    sblk: usize,
    dblk_local: u64,
    is_direct: bool,
) -> Result<()> {
    let ctx = (layout.clone(), sblk, dblk_local, is_direct);
    let h = cache.protect(addr, class_id::EA_DATA_BLOCK, &ctx, ProtectFlags::WRITE)?;
    let (page_addrs, had_depend) = {
        let blk = body_ref::<EaDataBlock>(cache, h, "ea_data_block")?;
        let addrs = if blk.is_paged() {
            (0..blk.n_pages()).map(|p| blk.page_addr(addr, p)).collect()
        } else {
            Vec::new()
        };
        (addrs, blk.hdr_depend)
    };
    cache.unprotect(h, UnprotectFlags::empty())?;

    for pa in page_addrs {
        if let Some(ph) = cache.handle_for(pa) {
            let page_had_depend =
                body_ref::<EaDataBlockPage>(cache, ph, "ea_data_block_page").map(|p| p.hdr_depend).unwrap_or(false);
            teardown_hdr_depend(cache, header_addr, ph, page_had_depend)?;
            cache.expunge(ph, None)?;
        }
    }

    let hh = cache.handle_for(addr).ok_or(Error::NotFound(addr))?;
    teardown_hdr_depend(cache, header_addr, hh, had_depend)?;
    cache.expunge(hh, None)?;
    Ok(())
}
