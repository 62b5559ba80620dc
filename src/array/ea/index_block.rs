//! The EA index block: inline elements plus direct data-block and
//! super-block address arrays (spec §3.1 "EA index block").

use crate::cache::{Address, UserData};
use crate::format::{self, magic};

use super::header::EaLayout;

#[derive(Debug, Clone)]
pub struct EaIndexBlock {
    /// `idx_blk_elmts` elements stored inline, `element_size` bytes each.
    pub elmts: Vec<u8>,
    /// One address per data block belonging to one of the first
    /// `nsblks` super blocks (spec §4.2.1 "addressed directly").
    pub direct_dblk_addrs: Vec<Address>,
    /// One address per super block from `nsblks` onward.
    pub sblk_addrs: Vec<Address>,
    /// In-core only: set once this block has a flush-dep edge from the
    /// header, so it's never re-created (spec §4.2.3 `has_hdr_depend`).
    pub hdr_depend: bool,
}

impl EaIndexBlock {
    pub fn new(layout: &EaLayout) -> Self {
        let direct_count: u64 = layout.sblk_info[..layout.nsblks].iter().map(|s| s.n_dblks).sum();
        Self {
            elmts: vec![0u8; layout.idx_blk_elmts as usize * layout.element_size as usize],
            direct_dblk_addrs: vec![Address::UNDEF; direct_count as usize],
            sblk_addrs: vec![Address::UNDEF; layout.sblk_info.len() - layout.nsblks],
            hdr_depend: false,
        }
    }

    pub fn elmt_slot(&mut self, layout: &EaLayout, i: u64) -> &mut [u8] {
        let sz = layout.element_size as usize;
        let off = i as usize * sz;
        &mut self.elmts[off..off + sz]
    }

    /// Offset of the first direct data-block slot belonging to super
    /// block `sblk` (valid only for `sblk < layout.nsblks`).
    pub fn direct_slot_base(&self, layout: &EaLayout, sblk: usize) -> usize {
        layout.sblk_info[..sblk].iter().map(|s| s.n_dblks as usize).sum()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = format::ImageWriter::new(magic::EA_INDEX_BLOCK, 0);
        w.push_class_id(crate::format::class_id::EA_INDEX_BLOCK as u8);
        w.put_bytes(&self.elmts);
        for a in &self.direct_dblk_addrs {
            w.put_addr(*a);
        }
        for a in &self.sblk_addrs {
            w.put_addr(*a);
        }
        w.finish()
    }

    pub fn decode(image: &[u8], addr: Address, layout: &EaLayout) -> crate::Result<Self> {
        let mut r = format::ImageReader::new(image, addr)?;
        r.expect_magic(magic::EA_INDEX_BLOCK, addr)?;
        let _version = r.read_u8()?;
        let _class_id = r.read_u8()?;

        let elmts_len = layout.idx_blk_elmts as usize * layout.element_size as usize;
        let elmts = r.read_bytes(elmts_len)?.to_vec();

        let direct_count: u64 = layout.sblk_info[..layout.nsblks].iter().map(|s| s.n_dblks).sum();
        let mut direct_dblk_addrs = Vec::with_capacity(direct_count as usize);
        for _ in 0..direct_count {
            direct_dblk_addrs.push(r.read_addr()?);
        }
        let sblk_count = layout.sblk_info.len() - layout.nsblks;
        let mut sblk_addrs = Vec::with_capacity(sblk_count);
        for _ in 0..sblk_count {
            sblk_addrs.push(r.read_addr()?);
        }
        Ok(Self { elmts, direct_dblk_addrs, sblk_addrs, hdr_depend: false })
    }

    pub fn image_size(layout: &EaLayout) -> usize {
        let direct_count: usize = layout.sblk_info[..layout.nsblks].iter().map(|s| s.n_dblks as usize).sum();
        let sblk_count = layout.sblk_info.len() - layout.nsblks;
        4 + 1 + 1 + layout.idx_blk_elmts as usize * layout.element_size as usize
            + (direct_count + sblk_count) * 8
            + 4
    }
}

pub struct EaIndexBlockClass;

impl crate::cache::CacheableClass for EaIndexBlockClass {
    fn class_id(&self) -> u32 {
        crate::format::class_id::EA_INDEX_BLOCK
    }
    fn name(&self) -> &'static str {
        "ea_index_block"
    }
    fn initial_image_size(&self, udata: UserData<'_>) -> usize {
        let layout = udata.downcast_ref::<EaLayout>().expect("EA layout context");
        EaIndexBlock::image_size(layout)
    }
    fn deserialize(&self, image: &[u8], addr: Address, udata: UserData<'_>) -> crate::Result<crate::cache::entry::Body> {
        let layout = udata.downcast_ref::<EaLayout>().expect("EA layout context");
        Ok(Box::new(EaIndexBlock::decode(image, addr, layout)?))
    }
    fn image_size(&self, body: &crate::cache::entry::Body) -> usize {
        let blk = body.downcast_ref::<EaIndexBlock>().expect("ea index block body");
        4 + 1 + 1 + blk.elmts.len() + (blk.direct_dblk_addrs.len() + blk.sblk_addrs.len()) * 8 + 4
    }
    fn serialize(&self, _addr: Address, body: &crate::cache::entry::Body, buf: &mut Vec<u8>) -> crate::Result<()> {
        let blk = body.downcast_ref::<EaIndexBlock>().expect("ea index block body");
        buf.extend_from_slice(&blk.encode());
        Ok(())
    }
}
