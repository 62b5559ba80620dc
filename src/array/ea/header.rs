//! The EA header: creation parameters, stats, the index-block address,
//! and the precomputed super-block index table (spec §3.1 "EA header").
//!
//! `sblk_info` is derived from the creation params at open/create time
//! rather than persisted — it's a pure function of
//! `(sup_blk_min_data_ptrs, data_blk_min_elmts, max_nelmts_bits)`, so
//! storing it on disk would only be redundant.

use crate::cache::{Address, UserData};
use crate::config::EaCreateParams;
use crate::format::{self, magic};

/// One row of the super-block index table (spec §3.1).
#[derive(Debug, Clone, Copy)]
pub struct SblkInfo {
    pub n_dblks: u64,
    pub dblk_nelmts: u64,
    /// First global element index (already offset past the inline
    /// index-block elements) this super block covers.
    pub start_idx: u64,
    /// First data-block ordinal (0-based, counting only data blocks
    /// belonging to super blocks) this super block covers.
    pub start_dblk: u64,
}

/// Growth law resolved for this crate (see DESIGN.md "EA `sblk_info`
/// growth law"): `n_dblks(k) = 2^⌈k/2⌉`, `dblk_nelmts(k) =
/// data_blk_min_elmts · 2^⌊k/2⌋`.
pub fn compute_sblk_info(params: &EaCreateParams) -> Vec<SblkInfo> {
    let max_idx = 1u64 << params.max_nelmts_bits;
    let mut table = Vec::new();
    let mut start_idx = params.idx_blk_elmts as u64;
    let mut start_dblk = 0u64;
    for k in 0u32..128 {
        let n_dblks = 1u64 << ((k + 1) / 2);
        let dblk_nelmts = (params.data_blk_min_elmts as u64) << (k / 2);
        table.push(SblkInfo { n_dblks, dblk_nelmts, start_idx, start_dblk });
        start_idx += n_dblks * dblk_nelmts;
        start_dblk += n_dblks;
        if start_idx >= max_idx {
            break;
        }
    }
    table
}

/// The first `nsblks` super blocks are small enough to have their data
/// blocks addressed directly from the index block (spec §4.2.1).
pub fn nsblks_direct(params: &EaCreateParams, table: &[SblkInfo]) -> usize {
    let mut total = 0u64;
    for (i, info) in table.iter().enumerate() {
        total += info.n_dblks;
        if total >= params.sup_blk_min_data_ptrs as u64 {
            return i + 1;
        }
    }
    table.len()
}

/// Where a global element index `idx >= idx_blk_elmts` lives: which
/// super block, which data block within it, which element within that
/// data block (spec §4.2.1).
#[derive(Debug, Clone, Copy)]
pub struct Location {
    pub sblk: usize,
    pub dblk_local: u64,
    pub elmt_in_dblk: u64,
}

#[derive(Debug, Clone)]
pub struct EaHeader {
    pub params: EaCreateParams,
    pub sblk_info: Vec<SblkInfo>,
    pub nsblks: usize,

    pub index_block_addr: Address,
    pub max_idx_set: Option<u64>,
    pub n_super_blocks: u64,
    pub n_data_blocks: u64,

    pub ref_count: u32,
    pub pending_delete: bool,
}

impl EaHeader {
    pub fn new(params: EaCreateParams) -> Self {
        let sblk_info = compute_sblk_info(&params);
        let nsblks = nsblks_direct(&params, &sblk_info);
        Self {
            params,
            sblk_info,
            nsblks,
            index_block_addr: Address::UNDEF,
            max_idx_set: None,
            n_super_blocks: 0,
            n_data_blocks: 0,
            ref_count: 0,
            pending_delete: false,
        }
    }

    pub fn locate(&self, j: u64) -> crate::Result<Location> {
        for (k, info) in self.sblk_info.iter().enumerate() {
            let span = info.n_dblks * info.dblk_nelmts;
            if j < info.start_idx + span {
                let local = j - info.start_idx;
                return Ok(Location {
                    sblk: k,
                    dblk_local: local / info.dblk_nelmts,
                    elmt_in_dblk: local % info.dblk_nelmts,
                });
            }
        }
        Err(crate::Error::corrupt("ea_index", format!("index {j} exceeds configured max_nelmts_bits")))
    }

    pub fn is_direct(&self, sblk: usize) -> bool {
        sblk < self.nsblks
    }

    pub fn layout(&self) -> EaLayout {
        EaLayout {
            element_size: self.params.element_size,
            idx_blk_elmts: self.params.idx_blk_elmts,
            nsblks: self.nsblks,
            sblk_info: self.sblk_info.clone(),
            max_dblk_page_bits: self.params.max_dblk_page_bits,
        }
    }
}

/// The subset of header state every other EA block class needs to know
/// its own layout, passed as `UserData` to `deserialize`/
/// `initial_image_size` since those calls can't borrow the header entry
/// itself (it may be the very entry being protected).
#[derive(Debug, Clone)]
pub struct EaLayout {
    pub element_size: u32,
    pub idx_blk_elmts: u32,
    pub nsblks: usize,
    pub sblk_info: Vec<SblkInfo>,
    pub max_dblk_page_bits: u8,
}

impl EaLayout {
    pub fn dblk_page_nelmts(&self, dblk_nelmts: u64) -> Option<u64> {
        if self.max_dblk_page_bits == 0 {
            return None;
        }
        let page_nelmts = 1u64 << self.max_dblk_page_bits;
        if dblk_nelmts > page_nelmts {
            Some(page_nelmts)
        } else {
            None
        }
    }
}

const HEADER_IMAGE_SIZE: usize =
    4 + 1 + 1 + 4 + 1 + 4 + 4 + 4 + 1 + 8 + 1 + 8 + 8 + 8 + 4;

impl EaHeader {
    fn encode(&self) -> Vec<u8> {
        let mut w = format::ImageWriter::new(magic::EA_HEADER, 0);
        w.push_class_id(crate::format::class_id::EA_HEADER as u8);
        w.put_u32(self.params.element_size);
        w.put_u8(self.params.max_nelmts_bits);
        w.put_u32(self.params.idx_blk_elmts);
        w.put_u32(self.params.sup_blk_min_data_ptrs);
        w.put_u32(self.params.data_blk_min_elmts);
        w.put_u8(self.params.max_dblk_page_bits);
        w.put_u64(self.index_block_addr.as_u64());
        w.put_u8(if self.max_idx_set.is_some() { 1 } else { 0 });
        w.put_u64(self.max_idx_set.unwrap_or(0));
        w.put_u64(self.n_super_blocks);
        w.put_u64(self.n_data_blocks);
        w.finish()
    }

    fn decode(image: &[u8], addr: Address) -> crate::Result<Self> {
        let mut r = format::ImageReader::new(image, addr)?;
        r.expect_magic(magic::EA_HEADER, addr)?;
        let _version = r.read_u8()?;
        let _class_id = r.read_u8()?;

        let element_size = r.read_u32()?;
        let max_nelmts_bits = r.read_u8()?;
        let idx_blk_elmts = r.read_u32()?;
        let sup_blk_min_data_ptrs = r.read_u32()?;
        let data_blk_min_elmts = r.read_u32()?;
        let max_dblk_page_bits = r.read_u8()?;
        let index_block_addr = r.read_addr()?;
        let has_max = r.read_u8()? != 0;
        let max_idx_raw = r.read_u64()?;
        let n_super_blocks = r.read_u64()?;
        let n_data_blocks = r.read_u64()?;

        let params = EaCreateParams {
            element_size,
            max_nelmts_bits,
            idx_blk_elmts,
            sup_blk_min_data_ptrs,
            data_blk_min_elmts,
            max_dblk_page_bits,
        };
        let mut header = EaHeader::new(params);
        header.index_block_addr = index_block_addr;
        header.max_idx_set = if has_max { Some(max_idx_raw) } else { None };
        header.n_super_blocks = n_super_blocks;
        header.n_data_blocks = n_data_blocks;
        Ok(header)
    }
}

pub struct EaHeaderClass;

impl crate::cache::CacheableClass for EaHeaderClass {
    fn class_id(&self) -> u32 {
        crate::format::class_id::EA_HEADER
    }
    fn name(&self) -> &'static str {
        "ea_header"
    }
    fn initial_image_size(&self, _udata: UserData<'_>) -> usize {
        HEADER_IMAGE_SIZE
    }
    fn deserialize(
        &self,
        image: &[u8],
        addr: Address,
        _udata: UserData<'_>,
    ) -> crate::Result<crate::cache::entry::Body> {
        Ok(Box::new(EaHeader::decode(image, addr)?))
    }
    fn image_size(&self, _body: &crate::cache::entry::Body) -> usize {
        HEADER_IMAGE_SIZE
    }
    fn serialize(&self, _addr: Address, body: &crate::cache::entry::Body, buf: &mut Vec<u8>) -> crate::Result<()> {
        let hdr = body.downcast_ref::<EaHeader>().expect("ea header body");
        buf.extend_from_slice(&hdr.encode());
        Ok(())
    }
}
