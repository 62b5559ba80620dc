//! Dataspace (`SDSPACE`) message (spec §6).
//!
//! As with `fsinfo`, this is a pure codec the object-header client would
//! use; nothing in the cache/array code depends on it, but spec §6 calls
//! out its layout as exact and compatibility-critical.

pub const H5S_UNLIMITED: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataspaceType {
    Scalar,
    Simple,
    Null,
}

impl DataspaceType {
    fn from_u8(v: u8) -> crate::Result<Self> {
        match v {
            0 => Ok(DataspaceType::Scalar),
            1 => Ok(DataspaceType::Simple),
            2 => Ok(DataspaceType::Null),
            other => Err(crate::Error::corrupt("dataspace.kind", format!("invalid value {other}"))),
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            DataspaceType::Scalar => 0,
            DataspaceType::Simple => 1,
            DataspaceType::Null => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataspaceMessage {
    pub kind: DataspaceType,
    pub current_dims: Vec<u64>,
    /// `Some(dim)` per axis; `H5S_UNLIMITED` marks an unbounded axis.
    pub max_dims: Option<Vec<u64>>,
}

impl DataspaceMessage {
    pub fn rank(&self) -> usize {
        self.current_dims.len()
    }

    pub fn decode(reader: &mut crate::format::ImageReader<'_>) -> crate::Result<Self> {
        let rank = reader.read_u8()? as usize;
        let flags = reader.read_u8()?;
        let kind = DataspaceType::from_u8(reader.read_u8()?)?;

        let current_dims: crate::Result<Vec<u64>> = (0..rank).map(|_| reader.read_u64()).collect();
        let current_dims = current_dims?;

        let max_dims = if flags & 0x1 != 0 {
            let dims: crate::Result<Vec<u64>> = (0..rank).map(|_| reader.read_u64()).collect();
            Some(dims?)
        } else {
            None
        };

        Ok(Self { kind, current_dims, max_dims })
    }

    pub fn encode(&self, w: &mut crate::format::ImageWriter) {
        w.put_u8(self.rank() as u8);
        w.put_u8(if self.max_dims.is_some() { 0x1 } else { 0x0 });
        w.put_u8(self.kind.to_u8());
        for &d in &self.current_dims {
            w.put_u64(d);
        }
        if let Some(max) = &self.max_dims {
            for &d in max {
                w.put_u64(d);
            }
        }
    }
}
