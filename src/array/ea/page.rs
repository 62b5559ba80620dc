//! An EA data-block page: the element buffer for one page of a paged
//! data block, allocated only once its first element is touched (spec
//! §3.1 "EA data-block page").

use crate::cache::{Address, UserData};
use crate::format::{self, magic};

/// `(page_nelmts, element_size)` — all a page needs to know its own
/// image size.
pub type PageCtx = (u64, u32);

/// The on-disk footprint of one page image: magic + version + class id
/// + raw elements + checksum. Shared with the owning data block, whose
/// page stride and allocation reservation must match this exactly or
/// adjacent pages overlap once flushed.
pub(crate) fn page_image_size(page_nelmts: u64, element_size: u32) -> usize {
    4 + 1 + 1 + page_nelmts as usize * element_size as usize + 4
}

#[derive(Debug, Clone)]
pub struct EaDataBlockPage {
    pub elmts: Vec<u8>,
    /// In-core only: set once this page has a flush-dep edge from the
    /// header, so it's never re-created (spec §4.2.3 `has_hdr_depend`).
    pub hdr_depend: bool,
}

impl EaDataBlockPage {
    pub fn new(ctx: &PageCtx) -> Self {
        let (page_nelmts, element_size) = *ctx;
        Self { elmts: vec![0u8; page_nelmts as usize * element_size as usize], hdr_depend: false }
    }

    fn encode(&self) -> Vec<u8> {
        let mut w = format::ImageWriter::new(magic::EA_DATA_BLOCK_PAGE, 0);
        w.push_class_id(crate::format::class_id::EA_DATA_BLOCK_PAGE as u8);
        w.put_bytes(&self.elmts);
        w.finish()
    }

    fn decode(image: &[u8], addr: Address, ctx: &PageCtx) -> crate::Result<Self> {
        let mut r = format::ImageReader::new(image, addr)?;
        r.expect_magic(magic::EA_DATA_BLOCK_PAGE, addr)?;
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

pub struct EaDataBlockPageClass;

impl crate::cache::CacheableClass for EaDataBlockPageClass {
    fn class_id(&self) -> u32 {
        crate::format::class_id::EA_DATA_BLOCK_PAGE
    }
    fn name(&self) -> &'static str {
        "ea_data_block_page"
    }
    fn initial_image_size(&self, udata: UserData<'_>) -> usize {
        let ctx = udata.downcast_ref::<PageCtx>().expect("EA page context");
        EaDataBlockPage::image_size(ctx)
    }
    fn deserialize(
        &self,
        image: &[u8],
        addr: Address,
        udata: UserData<'_>,
    ) -> crate::Result<crate::cache::entry::Body> {
        let ctx = udata.downcast_ref::<PageCtx>().expect("EA page context");
        Ok(Box::new(EaDataBlockPage::decode(image, addr, ctx)?))
    }
    fn image_size(&self, body: &crate::cache::entry::Body) -> usize {
        let page = body.downcast_ref::<EaDataBlockPage>().expect("ea page body");
        4 + 1 + 1 + page.elmts.len() + 4
    }
    fn serialize(&self, _addr: Address, body: &crate::cache::entry::Body, buf: &mut Vec<u8>) -> crate::Result<()> {
        let page = body.downcast_ref::<EaDataBlockPage>().expect("ea page body");
        buf.extend_from_slice(&page.encode());
        Ok(())
    }
}
