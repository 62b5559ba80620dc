//! Fill value (`FILL`) message (spec §6, design note "Fill values as a
//! sum type").
//!
//! Rather than mixing "no fill", "undefined", "default", and
//! "user-provided bytes" behind a size sentinel of -1 the way the
//! historical C message does, `Fill` is an explicit sum type plus
//! separate alloc-time/fill-time enums. Three on-disk versions exist;
//! v2 is only partially documented upstream, so (per spec §9's open
//! question) anything below version 3 that does not carry a definite
//! byte count decodes to `Fill::Undefined` rather than inferring intent.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fill {
    /// No fill value has ever been set; reads of untouched storage are
    /// undefined by the format (callers substitute their own default).
    Undefined,
    /// The implementation's ordinary default fill (zero-filled) applies.
    Default,
    /// An explicit fill value was supplied at creation time.
    User(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocTime {
    Early,
    Late,
    Incr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillTime {
    Alloc,
    Never,
    IfSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillMessage {
    pub version: u8,
    pub alloc_time: AllocTime,
    pub fill_time: FillTime,
    pub value: Fill,
}

const FLAG_HAVE_VALUE: u8 = 0x20;
const FLAG_UNDEFINED_VALUE: u8 = 0x10;

fn alloc_time_from_bits(bits: u8) -> crate::Result<AllocTime> {
    match bits {
        1 => Ok(AllocTime::Early),
        2 => Ok(AllocTime::Late),
        3 => Ok(AllocTime::Incr),
        other => Err(crate::Error::corrupt("fill.alloc_time", format!("invalid value {other}"))),
    }
}

fn fill_time_from_bits(bits: u8) -> crate::Result<FillTime> {
    match bits {
        0 => Ok(FillTime::IfSet),
        1 => Ok(FillTime::Alloc),
        2 => Ok(FillTime::Never),
        other => Err(crate::Error::corrupt("fill.fill_time", format!("invalid value {other}"))),
    }
}

impl FillMessage {
    /// Decode a v3+ flags-byte encoded fill message: one flags byte,
    /// encoding alloc-time (bits 0-1), fill-time (bits 2-3), and the two
    /// mutually exclusive bits `UNDEFINED_VALUE`/`HAVE_VALUE`; `HAVE_VALUE`
    /// is followed by a 4-byte size and that many raw bytes.
    pub fn decode_v3(bytes: &[u8]) -> crate::Result<Self> {
        let flags = *bytes.first().ok_or_else(|| crate::Error::corrupt("fill", "empty v3 message"))?;
        let alloc_time = alloc_time_from_bits(flags & 0x3)?;
        let fill_time = fill_time_from_bits((flags >> 2) & 0x3)?;

        let have_value = flags & FLAG_HAVE_VALUE != 0;
        let undefined = flags & FLAG_UNDEFINED_VALUE != 0;
        if have_value && undefined {
            return Err(crate::Error::corrupt("fill.flags", "HAVE_VALUE and UNDEFINED_VALUE both set"));
        }

        let value = if have_value {
            let size_bytes = bytes.get(1..5)
                .ok_or_else(|| crate::Error::corrupt("fill", "truncated size field"))?;
            let size = u32::from_le_bytes(size_bytes.try_into().unwrap()) as usize;
            let data = bytes.get(5..5 + size)
                .ok_or_else(|| crate::Error::corrupt("fill", "truncated value bytes"))?;
            Fill::User(data.to_vec())
        } else if undefined {
            Fill::Undefined
        } else {
            Fill::Default
        };

        Ok(FillMessage { version: 3, alloc_time, fill_time, value })
    }

    /// Pre-v3 decode: strict and conservative. Spec §9's open question is
    /// resolved here by never inferring "default" from ambiguous legacy
    /// bytes — only a definite, present byte count yields `Fill::User`;
    /// anything else is `Fill::Undefined`.
    pub fn decode_legacy(version: u8, bytes: &[u8]) -> crate::Result<Self> {
        if !(1..=2).contains(&version) {
            return Err(crate::Error::UnknownVersion {
                addr: crate::cache::Address::UNDEF,
                class: 0,
                version,
            });
        }
        // Legacy layout: alloc-time (1 byte), fill-time (1 byte, v2 only),
        // size (4 bytes signed; -1 means "no value").
        let mut pos = 0usize;
        let alloc_time = alloc_time_from_bits(*bytes.get(pos).ok_or_else(|| {
            crate::Error::corrupt("fill", "truncated legacy header")
        })?)?;
        pos += 1;
        let fill_time = if version == 2 {
            let bits = *bytes.get(pos).ok_or_else(|| crate::Error::corrupt("fill", "truncated legacy header"))?;
            pos += 1;
            fill_time_from_bits(bits)?
        } else {
            FillTime::IfSet
        };

        let size_bytes = bytes.get(pos..pos + 4);
        let value = match size_bytes {
            Some(sb) => {
                let size = i32::from_le_bytes(sb.try_into().unwrap());
                if size < 0 {
                    Fill::Undefined
                } else {
                    let size = size as usize;
                    let data = bytes.get(pos + 4..pos + 4 + size)
                        .ok_or_else(|| crate::Error::corrupt("fill", "truncated legacy value bytes"))?;
                    Fill::User(data.to_vec())
                }
            }
            None => Fill::Undefined,
        };

        Ok(FillMessage { version, alloc_time, fill_time, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v3_have_value_round_trips() {
        let mut bytes = vec![0x1 | (0x1 << 2) | FLAG_HAVE_VALUE];
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3, 4]);
        let msg = FillMessage::decode_v3(&bytes).unwrap();
        assert_eq!(msg.alloc_time, AllocTime::Early);
        assert_eq!(msg.fill_time, FillTime::Alloc);
        assert_eq!(msg.value, Fill::User(vec![1, 2, 3, 4]));
    }

    #[test]
    fn v3_undefined() {
        let bytes = vec![0x2 | (0x2 << 2) | FLAG_UNDEFINED_VALUE];
        let msg = FillMessage::decode_v3(&bytes).unwrap();
        assert_eq!(msg.value, Fill::Undefined);
    }

    #[test]
    fn legacy_negative_size_is_undefined() {
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&(-1i32).to_le_bytes());
        let msg = FillMessage::decode_legacy(1, &bytes).unwrap();
        assert_eq!(msg.value, Fill::Undefined);
    }

    #[test]
    fn legacy_truncated_is_undefined_not_inferred() {
        let bytes = vec![1u8];
        let msg = FillMessage::decode_legacy(1, &bytes).unwrap();
        assert_eq!(msg.value, Fill::Undefined);
    }
}
