//! The FA header: creation parameters, the single data block's address,
//! and in-core ref-counting state (spec §3.1 "FA header", §4.3).

use crate::cache::{Address, UserData};
use crate::config::FaCreateParams;
use crate::format::{self, magic};

#[derive(Debug, Clone)]
pub struct FaHeader {
    pub params: FaCreateParams,
    pub data_block_addr: Address,

    pub ref_count: u32,
    pub pending_delete: bool,
}

impl FaHeader {
    pub fn new(params: FaCreateParams) -> Self {
        Self { params, data_block_addr: Address::UNDEF, ref_count: 0, pending_delete: false }
    }

    pub fn page_nelmts(&self) -> Option<u64> {
        if !self.params.is_paged() {
            return None;
        }
        Some(1u64 << self.params.max_dblk_page_bits)
    }
}

const HEADER_IMAGE_SIZE: usize = 4 + 1 + 1 + 4 + 1 + 8 + 8 + 4;

impl FaHeader {
    fn encode(&self) -> Vec<u8> {
        let mut w = format::ImageWriter::new(magic::FA_HEADER, 0);
        w.push_class_id(crate::format::class_id::FA_HEADER as u8);
        w.put_u32(self.params.element_size);
        w.put_u8(self.params.max_dblk_page_bits);
        w.put_u64(self.params.nelmts);
        w.put_u64(self.data_block_addr.as_u64());
        w.finish()
    }

    fn decode(image: &[u8], addr: Address) -> crate::Result<Self> {
        let mut r = format::ImageReader::new(image, addr)?;
        r.expect_magic(magic::FA_HEADER, addr)?;
        let _version = r.read_u8()?;
        let _class_id = r.read_u8()?;
        let element_size = r.read_u32()?;
        let max_dblk_page_bits = r.read_u8()?;
        let nelmts = r.read_u64()?;
        let data_block_addr = r.read_addr()?;
        let params = FaCreateParams { element_size, max_dblk_page_bits, nelmts };
        let mut header = FaHeader::new(params);
        header.data_block_addr = data_block_addr;
        Ok(header)
    }
}

pub struct FaHeaderClass;

impl crate::cache::CacheableClass for FaHeaderClass {
    fn class_id(&self) -> u32 {
        crate::format::class_id::FA_HEADER
    }
    fn name(&self) -> &'static str {
        "fa_header"
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
        Ok(Box::new(FaHeader::decode(image, addr)?))
    }
    fn image_size(&self, _body: &crate::cache::entry::Body) -> usize {
        HEADER_IMAGE_SIZE
    }
    fn serialize(&self, _addr: Address, body: &crate::cache::entry::Body, buf: &mut Vec<u8>) -> crate::Result<()> {
        let hdr = body.downcast_ref::<FaHeader>().expect("fa header body");
        buf.extend_from_slice(&hdr.encode());
        Ok(())
    }
}
