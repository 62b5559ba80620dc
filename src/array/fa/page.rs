//! An FA data-block page: the element buffer for one page of a paged
//! data block (spec §4.3).

use crate::cache::{Address, UserData};
use crate::format::{self, magic};

/// `(page_nelmts, element_size)`.
pub type PageCtx = (u64, u32);

/// The on-disk footprint of one page image: magic + version + class id
/// + raw elements + checksum. Shared with the owning data block, whose
/// page stride and allocation reservation must match this exactly or
/// adjacent pages overlap once flushed.
pub(crate) fn page_image_size(page_nelmts: u64, element_size: u32) -> usize {
    4 + 1 + 1 + page_nelmts as usize * element_size as usize + 4
}

#[derive(Debug, Clone)]
pub struct FaDataBlockPage {
    pub elmts: Vec<u8>,
    pub hdr_depend: bool,
}

impl FaDataBlockPage {
    pub fn new(ctx: &PageCtx) -> Self {
        let (page_nelmts, element_size) = *ctx;
        Self { elmts: vec![0u8; page_nelmts as usize * element_size as usize], hdr_depend: false }
    }

    fn encode(&self) -> Vec<u8> {
        let mut w = format::ImageWriter::new(magic::FA_DATA_BLOCK_PAGE, 0);
        w.push_class_id(crate::format::class_id::FA_DATA_BLOCK_PAGE as u8);
        w.put_bytes(&self.elmts);
        w.finish()
    }

    fn decode(image: &[u8], addr: Address, ctx: &PageCtx) -> crate::Result<Self> {
        let mut r = format::ImageReader::new(image, addr)?;
        r.expect_magic(magic::FA_DATA_BLOCK_PAGE, addr)?;
        let _version = r.read_u8()?;
        let _class_id = r.read_u8()?;
        let (page_nelmts, element_size) = *ctx;
        let elmts = r.read_bytes(page_nelmts as usize * element_size as usize)?.to_vec();
        Ok(Self { elmts, hdr_depend: false })
    }

    fn image_size(ctx: &PageCtx) -> usize {
        let (page_nelmts, element_size) = *ctx;
        page_image_size(page_nelmts, element_size)
    }
}

pub struct FaDataBlockPageClass;

impl crate::cache::CacheableClass for FaDataBlockPageClass {
    fn class_id(&self) -> u32 {
        crate::format::class_id::FA_DATA_BLOCK_PAGE
    }
    fn name(&self) -> &'static str {
        "fa_data_block_page"
    }
    fn initial_image_size(&self, udata: UserData<'_>) -> usize {
        let ctx = udata.downcast_ref::<PageCtx>().expect("FA page context");
        FaDataBlockPage::image_size(ctx)
    }
    fn deserialize(
        &self,
        image: &[u8],
        addr: Address,
        udata: UserData<'_>,
    ) -> crate::Result<crate::cache::entry::Body> {
        let ctx = udata.downcast_ref::<PageCtx>().expect("FA page context");
        Ok(Box::new(FaDataBlockPage::decode(image, addr, ctx)?))
    }
    fn image_size(&self, body: &crate::cache::entry::Body) -> usize {
        let page = body.downcast_ref::<FaDataBlockPage>().expect("fa page body");
        4 + 1 + 1 + page.elmts.len() + 4
    }
    fn serialize(&self, _addr: Address, body: &crate::cache::entry::Body, buf: &mut Vec<u8>) -> crate::Result<()> {
        let page = body.downcast_ref::<FaDataBlockPage>().expect("fa page body");
        buf.extend_from_slice(&page.encode());
        Ok(())
    }
}
