//! An EA data block: either an inline element buffer (unpaged) or a
//! page-init bitmap prefix whose pages are separate, contiguously
//! addressed cache entries (spec §3.1 "EA data block", §4.2.1 paging
//! rule).
//!
//! A data block belonging to a direct super block (`sblk < nsblks`)
//! carries its own page-init bitmap, since there's no `EaSuperBlock`
//! entity to hold one for it; a data block belonging to an indirect
//! super block relies on that super block's bitmap instead (spec §3.1
//! "EA super block" row).

use crate::cache::{Address, UserData};
use crate::format::{self, magic};

use super::header::EaLayout;
use super::page::page_image_size;

#[derive(Debug, Clone)]
pub struct EaDataBlock {
    pub sblk_idx: usize,
    pub dblk_local: u64,
    pub dblk_nelmts: u64,
    pub element_size: u32,
    pub page_nelmts: Option<u64>,
    /// Inline elements; empty when paged.
    pub elmts: Vec<u8>,
    /// Own page-init bitmap; only populated for a direct (unpaged
    /// super-block-less) data block that is itself paged.
    pub own_page_bitmap: Vec<u8>,
    /// In-core only: set once this block has a flush-dep edge from the
    /// header, so it's never re-created (spec §4.2.3 `has_hdr_depend`).
    pub hdr_depend: bool,
}

impl EaDataBlock {
    pub fn new(layout: &EaLayout, sblk_idx: usize, dblk_local: u64, is_direct: bool) -> Self {
        let info = layout.sblk_info[sblk_idx];
        let page_nelmts = layout.dblk_page_nelmts(info.dblk_nelmts);
        let elmts = if page_nelmts.is_some() {
            Vec::new()
        } else {
            vec![0u8; info.dblk_nelmts as usize * layout.element_size as usize]
        };
        let own_page_bitmap = match (is_direct, page_nelmts) {
            (true, Some(page_nelmts)) => {
                let n_pages = info.dblk_nelmts / page_nelmts;
                vec![0u8; ((n_pages as usize) + 7) / 8]
            }
            _ => Vec::new(),
        };
        Self {
            sblk_idx,
            dblk_local,
            dblk_nelmts: info.dblk_nelmts,
            element_size: layout.element_size,
            page_nelmts,
            elmts,
            own_page_bitmap,
            hdr_depend: false,
        }
    }

    pub fn is_paged(&self) -> bool {
        self.page_nelmts.is_some()
    }

    pub fn n_pages(&self) -> u64 {
        match self.page_nelmts {
            Some(p) => self.dblk_nelmts / p,
            None => 0,
        }
    }

    /// On-disk address of page `p`, laid out contiguously right after
    /// this data block's own header+bitmap bytes. The stride is the
    /// full page *image* size, not just its raw elements, or adjacent
    /// pages would overlap each other's framing bytes.
    pub fn page_addr(&self, self_addr: Address, p: u64) -> Address {
        let page_nelmts = self.page_nelmts.expect("page_addr called on unpaged data block");
        let page_bytes = page_image_size(page_nelmts, self.element_size) as u64;
        Address::new(self_addr.as_u64() + self.header_len() as u64 + p * page_bytes)
    }

    fn header_len(&self) -> usize {
        4 + 1 + 1 + 4 + 8 + 4 + self.own_page_bitmap.len() + 4
    }

    /// The file-space size of this block's whole contiguous allocation:
    /// its own header plus every page, if paged. Used to size the
    /// bump allocation at creation time so later pages don't land past
    /// the reserved region.
    pub fn reserved_extent(&self) -> usize {
        match self.page_nelmts {
            Some(page_nelmts) => {
                let page_bytes = page_image_size(page_nelmts, self.element_size);
                self.header_len() + self.n_pages() as usize * page_bytes
            }
            None => self.image_size(),
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut w = format::ImageWriter::new(magic::EA_DATA_BLOCK, 0);
        w.push_class_id(crate::format::class_id::EA_DATA_BLOCK as u8);
        w.put_u32(self.sblk_idx as u32);
        w.put_u64(self.dblk_local);
        if self.is_paged() {
            w.put_u32(self.own_page_bitmap.len() as u32);
            w.put_bytes(&self.own_page_bitmap);
        } else {
            w.put_u32(self.elmts.len() as u32);
            w.put_bytes(&self.elmts);
        }
        w.finish()
    }

    fn decode(image: &[u8], addr: Address, layout: &EaLayout) -> crate::Result<Self> {
        let mut r = format::ImageReader::new(image, addr)?;
        r.expect_magic(magic::EA_DATA_BLOCK, addr)?;
        let _version = r.read_u8()?;
        let _class_id = r.read_u8()?;
        let sblk_idx = r.read_u32()? as usize;
        let dblk_local = r.read_u64()?;
        let info = layout.sblk_info[sblk_idx];
        let page_nelmts = layout.dblk_page_nelmts(info.dblk_nelmts);
        let payload_len = r.read_u32()? as usize;
        let payload = r.read_bytes(payload_len)?.to_vec();
        let (elmts, own_page_bitmap) = if page_nelmts.is_some() {
            (Vec::new(), payload)
        } else {
            (payload, Vec::new())
        };
        Ok(Self {
            sblk_idx,
            dblk_local,
            dblk_nelmts: info.dblk_nelmts,
            element_size: layout.element_size,
            page_nelmts,
            elmts,
            own_page_bitmap,
            hdr_depend: false,
        })
    }

    fn image_size(&self) -> usize {
        let payload_len = if self.is_paged() { self.own_page_bitmap.len() } else { self.elmts.len() };
        4 + 1 + 1 + 4 + 8 + 4 + payload_len + 4
    }
}

pub struct EaDataBlockClass;

impl crate::cache::CacheableClass for EaDataBlockClass {
    fn class_id(&self) -> u32 {
        crate::format::class_id::EA_DATA_BLOCK
    }
    fn name(&self) -> &'static str {
        "ea_data_block"
    }
    fn initial_image_size(&self, udata: UserData<'_>) -> usize {
        let (layout, sblk_idx, dblk_local, is_direct) =
            udata.downcast_ref::<(EaLayout, usize, u64, bool)>().expect("EA data-block context");
        EaDataBlock::new(layout, *sblk_idx, *dblk_local, *is_direct).image_size()
    }
    fn deserialize(
        &self,
        image: &[u8],
        addr: Address,
        udata: UserData<'_>,
    ) -> crate::Result<crate::cache::entry::Body> {
        let (layout, ..) = udata.downcast_ref::<(EaLayout, usize, u64, bool)>().expect("EA data-block context");
        Ok(Box::new(EaDataBlock::decode(image, addr, layout)?))
    }
    fn image_size(&self, body: &crate::cache::entry::Body) -> usize {
        body.downcast_ref::<EaDataBlock>().expect("ea data block body").image_size()
    }
    fn serialize(&self, _addr: Address, body: &crate::cache::entry::Body, buf: &mut Vec<u8>) -> crate::Result<()> {
        let blk = body.downcast_ref::<EaDataBlock>().expect("ea data block body");
        buf.extend_from_slice(&blk.encode());
        Ok(())
    }
}
