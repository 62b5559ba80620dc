//! The FA data block: either an inline element buffer (unpaged) or a
//! page-init bitmap prefix whose pages are separate, contiguously
//! addressed cache entries (spec §3.1 "FA data block", §4.3).
//!
//! Pages are allocated once, right after the block's header bytes, for
//! the whole array's lifetime — there is no super-block indirection
//! layer like the extensible array's, since `nelmts` never changes.

use crate::cache::{Address, UserData};
use crate::config::FaCreateParams;
use crate::format::{self, magic};

use super::page::page_image_size;

#[derive(Debug, Clone)]
pub struct FaDataBlock {
    pub nelmts: u64,
    pub element_size: u32,
    pub page_nelmts: Option<u64>,
    /// Inline elements; empty when paged.
    pub elmts: Vec<u8>,
    /// One bit per page; empty when unpaged.
    pub page_init_bitmap: Vec<u8>,
    /// In-core only: set once this block has a flush-dep edge from the
    /// header, so it's never re-created (spec §4.2.3 `has_hdr_depend`,
    /// reused here for the fixed array's single data block).
    pub hdr_depend: bool,
}

impl FaDataBlock {
    pub fn new(params: &FaCreateParams) -> Self {
        let page_nelmts = if params.is_paged() { Some(1u64 << params.max_dblk_page_bits) } else { None };
        let elmts = if page_nelmts.is_some() {
            Vec::new()
        } else {
            vec![0u8; params.nelmts as usize * params.element_size as usize]
        };
        let page_init_bitmap = match page_nelmts {
            Some(p) => {
                let n_pages = (params.nelmts + p - 1) / p;
                vec![0u8; ((n_pages as usize) + 7) / 8]
            }
            None => Vec::new(),
        };
        Self { nelmts: params.nelmts, element_size: params.element_size, page_nelmts, elmts, page_init_bitmap, hdr_depend: false }
    }

    pub fn is_paged(&self) -> bool {
        self.page_nelmts.is_some()
    }

    pub fn n_pages(&self) -> u64 {
        match self.page_nelmts {
            Some(p) => (self.nelmts + p - 1) / p,
            None => 0,
        }
    }

    pub fn page_initialized(&self, page: u64) -> bool {
        self.page_init_bitmap.get(page as usize / 8).map(|b| b & (1 << (page % 8)) != 0).unwrap_or(false)
    }

    pub fn set_page_initialized(&mut self, page: u64) {
        let bit = page as usize;
        if let Some(b) = self.page_init_bitmap.get_mut(bit / 8) {
            *b |= 1 << (bit % 8);
        }
    }

    /// On-disk address of page `p`, laid out contiguously right after
    /// this data block's own header bytes. The stride is the full page
    /// *image* size, not just its raw elements, or adjacent pages would
    /// overlap each other's framing bytes.
    pub fn page_addr(&self, self_addr: Address, p: u64) -> Address {
        let page_nelmts = self.page_nelmts.expect("page_addr called on unpaged data block");
        let page_bytes = page_image_size(page_nelmts, self.element_size) as u64;
        Address::new(self_addr.as_u64() + self.header_len() as u64 + p * page_bytes)
    }

    fn header_len(&self) -> usize {
        4 + 1 + 1 + 8 + 4 + self.page_init_bitmap.len() + 4
    }

    /// The file-space size of this block's whole contiguous allocation:
    /// its own header plus every page, if paged (spec §4.3 `fsf_size`).
    /// Also what creation must reserve via `bump_alloc`, since pages are
    /// placed arithmetically rather than separately allocated.
    pub fn fsf_size(&self) -> u64 {
        if let Some(page_nelmts) = self.page_nelmts {
            let page_bytes = page_image_size(page_nelmts, self.element_size) as u64;
            self.header_len() as u64 + self.n_pages() * page_bytes
        } else {
            self.image_size() as u64
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut w = format::ImageWriter::new(magic::FA_DATA_BLOCK, 0);
        w.push_class_id(crate::format::class_id::FA_DATA_BLOCK as u8);
        w.put_u64(self.nelmts);
        if self.is_paged() {
            w.put_u32(self.page_init_bitmap.len() as u32);
            w.put_bytes(&self.page_init_bitmap);
        } else {
            w.put_u32(self.elmts.len() as u32);
            w.put_bytes(&self.elmts);
        }
        w.finish()
    }

    fn decode(image: &[u8], addr: Address, params: &FaCreateParams) -> crate::Result<Self> {
        let mut r = format::ImageReader::new(image, addr)?;
        r.expect_magic(magic::FA_DATA_BLOCK, addr)?;
        let _version = r.read_u8()?;
        let _class_id = r.read_u8()?;
        let nelmts = r.read_u64()?;
        let page_nelmts = if params.is_paged() { Some(1u64 << params.max_dblk_page_bits) } else { None };
        let payload_len = r.read_u32()? as usize;
        let payload = r.read_bytes(payload_len)?.to_vec();
        let (elmts, page_init_bitmap) = if page_nelmts.is_some() { (Vec::new(), payload) } else { (payload, Vec::new()) };
        Ok(Self { nelmts, element_size: params.element_size, page_nelmts, elmts, page_init_bitmap, hdr_depend: false })
    }

    fn image_size(&self) -> usize {
        let payload_len = if self.is_paged() { self.page_init_bitmap.len() } else { self.elmts.len() };
        4 + 1 + 1 + 8 + 4 + payload_len + 4
    }
}

pub struct FaDataBlockClass;

impl crate::cache::CacheableClass for FaDataBlockClass {
    fn class_id(&self) -> u32 {
        crate::format::class_id::FA_DATA_BLOCK
    }
    fn name(&self) -> &'static str {
        "fa_data_block"
    }
    fn initial_image_size(&self, udata: UserData<'_>) -> usize {
        let params = udata.downcast_ref::<FaCreateParams>().expect("FA params context");
        FaDataBlock::new(params).image_size()
    }
    fn deserialize(
        &self,
        image: &[u8],
        addr: Address,
        udata: UserData<'_>,
    ) -> crate::Result<crate::cache::entry::Body> {
        let params = udata.downcast_ref::<FaCreateParams>().expect("FA params context");
        Ok(Box::new(FaDataBlock::decode(image, addr, params)?))
    }
    fn image_size(&self, body: &crate::cache::entry::Body) -> usize {
        body.downcast_ref::<FaDataBlock>().expect("fa data block body").image_size()
    }
    fn serialize(&self, _addr: Address, body: &crate::cache::entry::Body, buf: &mut Vec<u8>) -> crate::Result<()> {
        let blk = body.downcast_ref::<FaDataBlock>().expect("fa data block body");
        buf.extend_from_slice(&blk.encode());
        Ok(())
    }
    fn fsf_size(&self, body: &crate::cache::entry::Body) -> Option<u64> {
        let blk = body.downcast_ref::<FaDataBlock>().expect("fa data block body");
        Some(blk.fsf_size())
    }
}
