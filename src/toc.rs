// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The table of contents mapping bookmark keys to body offsets.
//!
//! On the wire each entry stores its offset with a +4 bias: offsets are
//! measured from a logical start of the addressable region that sits 4
//! bytes before the body. [wire_offset] and [body_offset] are the only
//! two places the bias lives; readers and writers route every conversion
//! through them.

use {
    crate::error::{Error, Result},
    byteorder::{WriteBytesExt, LE},
    scroll::Pread,
    std::collections::BTreeMap,
};

pub const TOC_MAGIC: u32 = 0xffff_fffe;

/// Bias between a body position and the offset stored on the wire.
const OFFSET_BIAS: u32 = 4;

/// Converts a body position into the offset stored in a TOC entry or in
/// the header's TOC locator field.
pub fn wire_offset(body: u32) -> u32 {
    body + OFFSET_BIAS
}

/// Reverses [wire_offset].
pub fn body_offset(wire: u32) -> Result<u32> {
    wire.checked_sub(OFFSET_BIAS)
        .ok_or(Error::BadToc("stored offset below addressable region"))
}

/// Key to body-offset index under construction while a body is written.
///
/// Keys iterate in ascending order, which is also the order the format
/// requires entries to be serialized in.
#[derive(Clone, Debug, Default)]
pub struct Toc {
    entries: BTreeMap<u32, u32>,
}

impl Toc {
    /// Records the body offset a key's value was written at.
    pub fn insert(&mut self, key: u32, body_offset: u32) {
        self.entries.insert(key, body_offset);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let count = u32::try_from(self.entries.len())
            .map_err(|_| Error::EncodingOverflow("too many TOC entries"))?;

        let mut buf = Vec::with_capacity(20 + self.entries.len() * 12);
        // Size of the TOC minus the leading size and magic words.
        buf.write_u32::<LE>(12 + count * 12)?;
        buf.write_u32::<LE>(TOC_MAGIC)?;
        // Identifier, then the offset of the next TOC (none).
        buf.write_u32::<LE>(1)?;
        buf.write_u32::<LE>(0)?;
        buf.write_u32::<LE>(count)?;

        for (key, offset) in &self.entries {
            buf.write_u32::<LE>(*key)?;
            buf.write_u32::<LE>(wire_offset(*offset))?;
            buf.write_u32::<LE>(0)?;
        }

        Ok(buf)
    }

    /// Parses the TOC block at `offset`, returning keys mapped to their
    /// stored (still biased) offsets. Later duplicates win.
    pub fn parse(data: &[u8], mut offset: usize) -> Result<BTreeMap<u32, u32>> {
        let _size = data.gread_with::<u32>(&mut offset, scroll::LE)?;
        let magic = data.gread_with::<u32>(&mut offset, scroll::LE)?;
        if magic != TOC_MAGIC {
            return Err(Error::BadToc("magic mismatch"));
        }
        let _identifier = data.gread_with::<u32>(&mut offset, scroll::LE)?;
        let _next_toc = data.gread_with::<u32>(&mut offset, scroll::LE)?;
        let count = data.gread_with::<u32>(&mut offset, scroll::LE)?;

        let entries_len = (count as usize)
            .checked_mul(12)
            .ok_or(Error::BadToc("entry count overruns buffer"))?;
        if offset.checked_add(entries_len).map_or(true, |end| end > data.len()) {
            return Err(Error::BadToc("entry count overruns buffer"));
        }

        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = data.gread_with::<u32>(&mut offset, scroll::LE)?;
            let stored = data.gread_with::<u32>(&mut offset, scroll::LE)?;
            let _reserved = data.gread_with::<u32>(&mut offset, scroll::LE)?;
            map.insert(key, stored);
        }

        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_bias_is_symmetric() {
        assert_eq!(wire_offset(0), 4);
        assert_eq!(body_offset(wire_offset(1234)).unwrap(), 1234);
        assert!(body_offset(3).is_err());
    }

    #[test]
    fn entries_serialize_sorted_ascending() {
        let mut toc = Toc::default();
        toc.insert(0x2002, 96);
        toc.insert(0x1004, 0);
        toc.insert(0xd010, 48);
        let bytes = toc.to_bytes().unwrap();

        assert_eq!(bytes.len(), 20 + 3 * 12);
        assert_eq!(&bytes[..4], &(12u32 + 36).to_le_bytes());
        assert_eq!(&bytes[4..8], &TOC_MAGIC.to_le_bytes());

        let keys: Vec<u32> = (0..3)
            .map(|i| u32::from_le_bytes(bytes[20 + i * 12..24 + i * 12].try_into().unwrap()))
            .collect();
        assert_eq!(keys, vec![0x1004, 0x2002, 0xd010]);
    }

    #[test]
    fn round_trip_applies_the_bias() {
        let mut toc = Toc::default();
        toc.insert(0x1004, 100);
        toc.insert(0x1005, 200);
        let bytes = toc.to_bytes().unwrap();

        let parsed = Toc::parse(&bytes, 0).unwrap();
        assert_eq!(parsed[&0x1004], 104);
        assert_eq!(body_offset(parsed[&0x1004]).unwrap(), 100);
        assert_eq!(body_offset(parsed[&0x1005]).unwrap(), 200);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut toc = Toc::default();
        toc.insert(0x1004, 0);
        let mut bytes = toc.to_bytes().unwrap();
        bytes[4] = 0xff;
        assert!(matches!(Toc::parse(&bytes, 0), Err(Error::BadToc(_))));
    }

    #[test]
    fn overlong_entry_count_is_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(12u32 + 12).to_le_bytes());
        bytes.extend_from_slice(&TOC_MAGIC.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&1000u32.to_le_bytes());
        assert!(matches!(Toc::parse(&bytes, 0), Err(Error::BadToc(_))));
    }
}
