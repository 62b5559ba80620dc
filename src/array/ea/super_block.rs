//! An EA super block: one entry in the index-block's indirect
//! addressing range (`sblk >= nsblks`), holding the data-block address
//! array and (if paged) a page-init bitmap (spec §3.1 "EA super block").

use crate::cache::{Address, UserData};
use crate::format::{self, magic};

use super::header::EaLayout;

#[derive(Debug, Clone)]
pub struct EaSuperBlock {
    pub sblk_idx: usize,
    pub dblk_addrs: Vec<Address>,
    /// One bit per `(data block, page)` pair; empty if this super
    /// block's data blocks aren't paged.
    pub page_init_bitmap: Vec<u8>,
    /// In-core only: set once this block has a flush-dep edge from the
    /// header, so it's never re-created (spec §4.2.3 `has_hdr_depend`).
    pub hdr_depend: bool,
}

fn bitmap_bytes(n_dblks: u64, n_pages: u64) -> usize {
    ((n_dblks * n_pages) as usize + 7) / 8
}

impl EaSuperBlock {
    pub fn new(layout: &EaLayout, sblk_idx: usize) -> Self {
        let info = layout.sblk_info[sblk_idx];
        let n_pages = layout.dblk_page_nelmts(info.dblk_nelmts).map(|p| info.dblk_nelmts / p).unwrap_or(0);
        Self {
            sblk_idx,
            dblk_addrs: vec![Address::UNDEF; info.n_dblks as usize],
            page_init_bitmap: vec![0u8; bitmap_bytes(info.n_dblks, n_pages)],
            hdr_depend: false,
        }
    }

    pub fn page_initialized(&self, dblk_local: u64, page: u64, n_pages: u64) -> bool {
        let bit = dblk_local * n_pages + page;
        self.page_init_bitmap
            .get(bit as usize / 8)
            .map(|b| b & (1 << (bit % 8)) != 0)
            .unwrap_or(false)
    }

    pub fn set_page_initialized(&mut self, dblk_local: u64, page: u64, n_pages: u64) {
        let bit = (dblk_local * n_pages + page) as usize;
        if let Some(b) = self.page_init_bitmap.get_mut(bit / 8) {
            *b |= 1 << (bit % 8);
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut w = format::ImageWriter::new(magic::EA_SUPER_BLOCK, 0);
        w.push_class_id(crate::format::class_id::EA_SUPER_BLOCK as u8);
        w.put_u32(self.sblk_idx as u32);
        for a in &self.dblk_addrs {
            w.put_addr(*a);
        }
        w.put_u32(self.page_init_bitmap.len() as u32);
        w.put_bytes(&self.page_init_bitmap);
        w.finish()
    }

    fn decode(image: &[u8], addr: Address, layout: &EaLayout) -> crate::Result<Self> {
        let mut r = format::ImageReader::new(image, addr)?;
        r.expect_magic(magic::EA_SUPER_BLOCK, addr)?;
        let _version = r.read_u8()?;
        let _class_id = r.read_u8()?;
        let sblk_idx = r.read_u32()? as usize;
        let info = layout.sblk_info[sblk_idx];
        let mut dblk_addrs = Vec::with_capacity(info.n_dblks as usize);
        for _ in 0..info.n_dblks {
            dblk_addrs.push(r.read_addr()?);
        }
        let bitmap_len = r.read_u32()? as usize;
        let page_init_bitmap = r.read_bytes(bitmap_len)?.to_vec();
        Ok(Self { sblk_idx, dblk_addrs, page_init_bitmap, hdr_depend: false })
    }

    fn image_size(&self) -> usize {
        4 + 1 + 1 + 4 + self.dblk_addrs.len() * 8 + 4 + self.page_init_bitmap.len() + 4
    }
}

pub struct EaSuperBlockClass;

impl crate::cache::CacheableClass for EaSuperBlockClass {
    fn class_id(&self) -> u32 {
        crate::format::class_id::EA_SUPER_BLOCK
    }
    fn name(&self) -> &'static str {
        "ea_super_block"
    }
    fn initial_image_size(&self, udata: UserData<'_>) -> usize {
        let (layout, sblk_idx) = udata.downcast_ref::<(EaLayout, usize)>().expect("EA super-block context");
        EaSuperBlock::new(layout, *sblk_idx).image_size()
    }
    fn deserialize(
        &self,
        image: &[u8],
        addr: Address,
        udata: UserData<'_>,
    ) -> crate::Result<crate::cache::entry::Body> {
        let (layout, _sblk_idx) = udata.downcast_ref::<(EaLayout, usize)>().expect("EA super-block context");
        Ok(Box::new(EaSuperBlock::decode(image, addr, layout)?))
    }
    fn image_size(&self, body: &crate::cache::entry::Body) -> usize {
        body.downcast_ref::<EaSuperBlock>().expect("ea super block body").image_size()
    }
    fn serialize(&self, _addr: Address, body: &crate::cache::entry::Body, buf: &mut Vec<u8>) -> crate::Result<()> {
        let blk = body.downcast_ref::<EaSuperBlock>().expect("ea super block body");
        buf.extend_from_slice(&blk.encode());
        Ok(())
    }
}
