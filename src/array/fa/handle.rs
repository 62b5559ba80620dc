//! The fixed-array public API: `create`/`open`/`get`/`set`/`iterate`/
//! `depend`/`close`/`delete`, the same shape as the extensible array's
//! but over a single data block with no super-block indirection (spec
//! §4.3).

use std::any::Any;

use crate::array::bump_alloc;
use crate::cache::{Address, Cache, CacheableClass, Handle, InsertFlags, ProtectFlags, Ring, UnprotectFlags};
use crate::cache::ring_named;
use crate::config::FaCreateParams;
use crate::format::class_id;
use crate::{Error, Result};

use super::data_block::FaDataBlock;
use super::header::FaHeader;
use super::page::{FaDataBlockPage, PageCtx};

const FA_RING: Ring = ring_named::USER;

#[derive(Debug, Clone, Copy)]
pub struct FaHandle {
    addr: Address,
}

impl FaHandle {
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

/// `create(store, params, ctx) → addr` (spec §4.3): allocate the
/// header; the data block is created lazily on first `set`.
pub fn create(cache: &mut Cache, params: FaCreateParams) -> Result<Address> {
    params.validate()?;
    let class = cache
        .classes()
        .get(class_id::FA_HEADER)
        .ok_or_else(|| Error::corrupt("fa_header_class", "class not registered"))?;
    let size = class.initial_image_size(&());
    let addr = bump_alloc(&**cache.store(), size as u64)?;
    let header = FaHeader::new(params);
    cache.insert(addr, class_id::FA_HEADER, Box::new(header), size, FA_RING, InsertFlags::DIRTY)?;
    Ok(addr)
}

/// `open(store, addr, ctx) → Handle` (spec §4.3).
pub fn open(cache: &mut Cache, addr: Address) -> Result<FaHandle> {
    let h = cache.protect(addr, class_id::FA_HEADER, &(), ProtectFlags::WRITE)?;
    let refused = body_ref::<FaHeader>(cache, h, "fa_header")?.pending_delete;
    if refused {
        cache.unprotect(h, UnprotectFlags::empty())?;
        return Err(Error::corrupt("fa_header", "cannot open: pending delete"));
    }
    body_mut::<FaHeader>(cache, h, "fa_header")?.ref_count += 1;
    cache.unprotect(h, UnprotectFlags::empty())?;
    Ok(FaHandle { addr })
}

/// `get(handle, i) → element` (spec §4.3, invariant I9): the fill value
/// (a zero-filled buffer) for any `i` never `set`, `Error` for `i >=
/// nelmts`.
pub fn get(cache: &mut Cache, handle: &FaHandle, i: u64) -> Result<Vec<u8>> {
    let h = cache.protect(handle.addr, class_id::FA_HEADER, &(), ProtectFlags::READ_ONLY)?;
    let (params, data_block_addr) = {
        let hdr = body_ref::<FaHeader>(cache, h, "fa_header")?;
        (hdr.params, hdr.data_block_addr)
    };
    cache.unprotect(h, UnprotectFlags::empty())?;

    if i >= params.nelmts {
        return Err(Error::corrupt("fa_index", format!("index {i} exceeds configured nelmts {}", params.nelmts)));
    }

    let fill = vec![0u8; params.element_size as usize];
    if !data_block_addr.is_defined() {
        return Ok(fill);
    }

    let db_h = cache.protect(data_block_addr, class_id::FA_DATA_BLOCK, &params, ProtectFlags::READ_ONLY)?;
    let page_nelmts = body_ref::<FaDataBlock>(cache, db_h, "fa_data_block")?.page_nelmts;

    let Some(page_nelmts) = page_nelmts else {
        let blk = body_ref::<FaDataBlock>(cache, db_h, "fa_data_block")?;
        let off = i as usize * params.element_size as usize;
        let out = blk.elmts[off..off + params.element_size as usize].to_vec();
        cache.unprotect(db_h, UnprotectFlags::empty())?;
        return Ok(out);
    };

    let page = i / page_nelmts;
    let elmt_in_page = i % page_nelmts;
    let initialized = body_ref::<FaDataBlock>(cache, db_h, "fa_data_block")?.page_initialized(page);

    if !initialized {
        cache.unprotect(db_h, UnprotectFlags::empty())?;
        return Ok(fill);
    }

    let page_addr = body_ref::<FaDataBlock>(cache, db_h, "fa_data_block")?.page_addr(data_block_addr, page);
    cache.unprotect(db_h, UnprotectFlags::empty())?;

    let page_ctx: PageCtx = (page_nelmts, params.element_size);
    let pg_h = cache.protect(page_addr, class_id::FA_DATA_BLOCK_PAGE, &page_ctx, ProtectFlags::READ_ONLY)?;
    let out = {
        let pg = body_ref::<FaDataBlockPage>(cache, pg_h, "fa_data_block_page")?;
        let off = elmt_in_page as usize * params.element_size as usize;
        pg.elmts[off..off + params.element_size as usize].to_vec()
    };
    cache.unprotect(pg_h, UnprotectFlags::empty())?;
    Ok(out)
}

/// `set(handle, i, element)` (spec §4.3): lazily create the data block
/// and, if paged, the touched page.
pub fn set(cache: &mut Cache, handle: &FaHandle, i: u64, element: &[u8]) -> Result<()> {
    let hh = cache.protect(handle.addr, class_id::FA_HEADER, &(), ProtectFlags::WRITE)?;
    let (params, mut data_block_addr) = {
        let hdr = body_ref::<FaHeader>(cache, hh, "fa_header")?;
        (hdr.params, hdr.data_block_addr)
    };

    if i >= params.nelmts {
        cache.unprotect(hh, UnprotectFlags::empty())?;
        return Err(Error::corrupt("fa_index", format!("index {i} exceeds configured nelmts {}", params.nelmts)));
    }
    if element.len() != params.element_size as usize {
        cache.unprotect(hh, UnprotectFlags::empty())?;
        return Err(Error::corrupt("element", "length does not match the array's configured element size"));
    }

    if !data_block_addr.is_defined() {
        let class = cache
            .classes()
            .get(class_id::FA_DATA_BLOCK)
            .ok_or_else(|| Error::corrupt("fa_data_block_class", "class not registered"))?;
        let size = class.initial_image_size(&params);
        let blk = FaDataBlock::new(&params);
        // Reserve the whole contiguous header+pages extent up front;
        // pages are placed arithmetically after the header, not
        // bump-allocated individually.
        let addr = bump_alloc(&**cache.store(), blk.fsf_size())?;
        let db_h = cache.insert(addr, class_id::FA_DATA_BLOCK, Box::new(blk), size, FA_RING, InsertFlags::DIRTY)?;
        body_mut::<FaDataBlock>(cache, db_h, "fa_data_block")?.hdr_depend = true;
        cache.flush_dep_create(hh, db_h)?;
        data_block_addr = addr;
        body_mut::<FaHeader>(cache, hh, "fa_header")?.data_block_addr = addr;
    }

    let db_h = cache.protect(data_block_addr, class_id::FA_DATA_BLOCK, &params, ProtectFlags::WRITE)?;
    let page_nelmts = body_ref::<FaDataBlock>(cache, db_h, "fa_data_block")?.page_nelmts;

    let Some(page_nelmts) = page_nelmts else {
        let blk = body_mut::<FaDataBlock>(cache, db_h, "fa_data_block")?;
        let off = i as usize * params.element_size as usize;
        blk.elmts[off..off + params.element_size as usize].copy_from_slice(element);
        cache.unprotect(db_h, UnprotectFlags::DIRTIED)?;
        cache.unprotect(hh, UnprotectFlags::empty())?;
        return Ok(());
    };

    let page = i / page_nelmts;
    let elmt_in_page = i % page_nelmts;
    let already_initialized = body_ref::<FaDataBlock>(cache, db_h, "fa_data_block")?.page_initialized(page);
    let page_addr = body_ref::<FaDataBlock>(cache, db_h, "fa_data_block")?.page_addr(data_block_addr, page);

    let mut db_dirty = false;
    if !already_initialized {
        body_mut::<FaDataBlock>(cache, db_h, "fa_data_block")?.set_page_initialized(page);
        db_dirty = true;

        let page_ctx: PageCtx = (page_nelmts, params.element_size);
        let page_body = FaDataBlockPage::new(&page_ctx);
        let class = cache
            .classes()
            .get(class_id::FA_DATA_BLOCK_PAGE)
            .ok_or_else(|| Error::corrupt("fa_data_block_page_class", "class not registered"))?;
        let size = class.initial_image_size(&page_ctx);
        cache.insert(page_addr, class_id::FA_DATA_BLOCK_PAGE, Box::new(page_body), size, FA_RING, InsertFlags::DIRTY)?;
        if let Some(pg_h) = cache.handle_for(page_addr) {
            body_mut::<FaDataBlockPage>(cache, pg_h, "fa_data_block_page")?.hdr_depend = true;
            cache.flush_dep_create(hh, pg_h)?;
        }
    }
    cache.unprotect(db_h, if db_dirty { UnprotectFlags::DIRTIED } else { UnprotectFlags::empty() })?;
    cache.unprotect(hh, UnprotectFlags::empty())?;

    let page_ctx: PageCtx = (page_nelmts, params.element_size);
    let pg_h = cache.protect(page_addr, class_id::FA_DATA_BLOCK_PAGE, &page_ctx, ProtectFlags::WRITE)?;
    {
        let pg = body_mut::<FaDataBlockPage>(cache, pg_h, "fa_data_block_page")?;
        let off = elmt_in_page as usize * params.element_size as usize;
        pg.elmts[off..off + params.element_size as usize].copy_from_slice(element);
    }
    cache.unprotect(pg_h, UnprotectFlags::DIRTIED)?;
    Ok(())
}

/// `iterate(handle, op)` (spec §4.3): visit every index `0..nelmts`.
pub fn iterate<F>(cache: &mut Cache, handle: &FaHandle, mut op: F) -> Result<()>
where
    F: FnMut(u64, &[u8]) -> Result<bool>,
{
    let h = cache.protect(handle.addr, class_id::FA_HEADER, &(), ProtectFlags::READ_ONLY)?;
    let nelmts = body_ref::<FaHeader>(cache, h, "fa_header")?.params.nelmts;
    cache.unprotect(h, UnprotectFlags::empty())?;

    for i in 0..nelmts {
        let element = get(cache, handle, i)?;
        if !op(i, &element)? {
            break;
        }
    }
    Ok(())
}

/// `depend(handle, external_parent_proxy)` (spec §4.3).
pub fn depend(cache: &mut Cache, handle: &FaHandle, external_parent_proxy: Handle) -> Result<()> {
    let header_handle = cache.handle_for(handle.addr).ok_or(Error::NotFound(handle.addr))?;
    cache.flush_dep_create(external_parent_proxy, header_handle)
}

/// `close(handle)` (spec §4.3): on last close, if `pending_delete`,
/// delete the whole structure.
pub fn close(cache: &mut Cache, handle: FaHandle) -> Result<()> {
    let h = cache.protect(handle.addr, class_id::FA_HEADER, &(), ProtectFlags::WRITE)?;
    let should_delete = {
        let hdr = body_mut::<FaHeader>(cache, h, "fa_header")?;
        hdr.ref_count = hdr.ref_count.saturating_sub(1);
        hdr.ref_count == 0 && hdr.pending_delete
    };
    cache.unprotect(h, UnprotectFlags::empty())?;
    if should_delete {
        delete(cache, handle.addr)?;
    }
    Ok(())
}

/// `delete(store, addr, ctx)` (spec §4.3): detach the header, data
/// block, and every page from the cache. The data block's `fsf_size`
/// hook tells the owning free-space manager the whole contiguous
/// header+pages extent can be released in one call; this crate itself
/// reclaims no file-space bytes (see `array::bump_alloc`).
pub fn delete(cache: &mut Cache, addr: Address) -> Result<()> {
    let h = cache.protect(addr, class_id::FA_HEADER, &(), ProtectFlags::WRITE)?;
    let (params, data_block_addr) = {
        let hdr = body_ref::<FaHeader>(cache, h, "fa_header")?;
        (hdr.params, hdr.data_block_addr)
    };
    cache.unprotect(h, UnprotectFlags::empty())?;

    if data_block_addr.is_defined() {
        delete_data_block(cache, addr, data_block_addr, &params)?;
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

fn delete_data_block(cache: &mut Cache, header_addr: Address, addr: Address, params: &FaCreateParams) -> Result<()> {
    let h = cache.protect(addr, class_id::FA_DATA_BLOCK, params, ProtectFlags::WRITE)?;
    let (page_addrs, had_depend) = {
        let blk = body_ref::<FaDataBlock>(cache, h, "fa_data_block")?;
        let addrs = if blk.is_paged() { (0..blk.n_pages()).map(|p| blk.page_addr(addr, p)).collect() } else { Vec::new() };
        (addrs, blk.hdr_depend)
    };
    cache.unprotect(h, UnprotectFlags::empty())?;

    for pa in page_addrs {
        if let Some(ph) = cache.handle_for(pa) {
            let page_had_depend =
                body_ref::<FaDataBlockPage>(cache, ph, "fa_data_block_page").map(|p| p.hdr_depend).unwrap_or(false);
            teardown_hdr_depend(cache, header_addr, ph, page_had_depend)?;
            cache.expunge(ph, None)?;
        }
    }

    let hh = cache.handle_for(addr).ok_or(Error::NotFound(addr))?;
    teardown_hdr_depend(cache, header_addr, hh, had_depend)?;
    cache.expunge(hh, None)?;
    Ok(())
}
