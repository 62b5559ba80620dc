//! Free-space-manager info (`FSINFO`) message, version 1 (spec §6).
//!
//! Kept as a pure codec type: nothing in the cache or array code needs
//! to interpret it, but spec §6 marks its wire layout as
//! compatibility-critical and a neighboring (out-of-scope) object-header
//! client would decode it through this same framing.

use crate::cache::Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmStrategy {
    FsmAggr,
    Page,
    Aggr,
    None,
}

impl FsmStrategy {
    fn from_u8(v: u8) -> crate::Result<Self> {
        match v {
            0 => Ok(FsmStrategy::FsmAggr),
            1 => Ok(FsmStrategy::Page),
            2 => Ok(FsmStrategy::Aggr),
            3 => Ok(FsmStrategy::None),
            other => Err(crate::Error::corrupt("fsinfo.strategy", format!("invalid value {other}"))),
        }
    }
}

/// 6 small + 6 large memory-type classes (spec §6).
pub const N_MEM_TYPES: usize = 12;

#[derive(Debug, Clone)]
pub struct FsInfoMessage {
    pub strategy: FsmStrategy,
    pub persist: bool,
    pub threshold: u64,
    pub page_size: u32,
    pub page_end_meta_threshold: u32,
    pub eoa_pre_fsm_fsalloc: Address,
    /// Present only when `persist` is set.
    pub fsm_addrs: Option<[Address; N_MEM_TYPES]>,
}

impl FsInfoMessage {
    pub fn decode(reader: &mut crate::format::ImageReader<'_>) -> crate::Result<Self> {
        let strategy = FsmStrategy::from_u8(reader.read_u8()?)?;
        let persist = reader.read_u8()? != 0;
        let threshold = reader.read_u64()?;
        let page_size = reader.read_u32()?;
        let page_end_meta_threshold = reader.read_u32()?;
        let eoa_pre_fsm_fsalloc = reader.read_addr()?;

        let fsm_addrs = if persist {
            let mut addrs = [Address::UNDEF; N_MEM_TYPES];
            for slot in &mut addrs {
                *slot = reader.read_addr()?;
            }
            Some(addrs)
        } else {
            None
        };

        Ok(Self {
            strategy,
            persist,
            threshold,
            page_size,
            page_end_meta_threshold,
            eoa_pre_fsm_fsalloc,
            fsm_addrs,
        })
    }

    pub fn encode(&self, w: &mut crate::format::ImageWriter) {
        w.put_u8(match self.strategy {
            FsmStrategy::FsmAggr => 0,
            FsmStrategy::Page => 1,
            FsmStrategy::Aggr => 2,
            FsmStrategy::None => 3,
        });
        w.put_u8(self.persist as u8);
        w.put_u64(self.threshold);
        w.put_u32(self.page_size);
        w.put_u32(self.page_end_meta_threshold);
        w.put_addr(self.eoa_pre_fsm_fsalloc);
        if let Some(addrs) = &self.fsm_addrs {
            for a in addrs {
                w.put_addr(*a);
            }
        }
    }
}
