// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The legacy Alias Manager record.
//!
//! A record is a fixed 150 byte prefix followed by tagged variable
//! length extensions, everything big endian, terminated by the sentinel
//! tag `0xffff`. Strings inside the prefix are Pascal style and
//! carbonised: every `/` becomes the two bytes `3a 00`, the classic
//! Mac OS path separator convention.

use {
    crate::{
        date,
        error::{Error, Result},
    },
    byteorder::{ByteOrder, WriteBytesExt, BE},
    chrono::{DateTime, Utc},
};

pub const KIND_FILE: u16 = 0;
pub const KIND_FOLDER: u16 = 1;

pub const DISK_TYPE_FIXED: u16 = 0;
pub const DISK_TYPE_NETWORK: u16 = 1;
pub const DISK_TYPE_FLOPPY_400K: u16 = 2;
pub const DISK_TYPE_FLOPPY_800K: u16 = 3;
pub const DISK_TYPE_FLOPPY_1_44M: u16 = 4;
pub const DISK_TYPE_EJECTABLE: u16 = 5;

pub const TAG_CARBON_FOLDER_NAME: u16 = 0;
pub const TAG_CNID_PATH: u16 = 1;
pub const TAG_CARBON_PATH: u16 = 2;
pub const TAG_UNICODE_FILENAME: u16 = 14;
pub const TAG_UNICODE_VOLUME_NAME: u16 = 15;
pub const TAG_HIGH_RES_VOLUME_CREATION_DATE: u16 = 16;
pub const TAG_HIGH_RES_CREATION_DATE: u16 = 17;
pub const TAG_POSIX_PATH: u16 = 18;
pub const TAG_POSIX_PATH_TO_MOUNTPOINT: u16 = 19;

const TAG_SENTINEL: u16 = 0xffff;

/// Length of the fixed prefix before the extension stream.
pub const PREFIX_SIZE: usize = 150;

const VOLUME_NAME_WIDTH: usize = 28;
const TARGET_NAME_WIDTH: usize = 64;

/// An in-memory alias record.
///
/// For persisting references to files prefer [crate::BookmarkData],
/// which is what current macOS writes to disk; the record format is
/// retained for interoperability with Carbon era consumers.
#[derive(Clone, Debug, PartialEq)]
pub struct AliasRecord {
    /// Application specific four character code.
    pub app_code: [u8; 4],
    /// Format version, always 2.
    pub version: u16,
    /// [KIND_FILE] or [KIND_FOLDER].
    pub kind: u16,
    pub volume_name: String,
    pub volume_date: DateTime<Utc>,
    /// Filesystem signature, "H+" for HFS+.
    pub filesystem: String,
    pub disk_type: u16,
    /// CNID of the containing folder.
    pub folder_cnid: u32,
    pub target_name: String,
    pub target_cnid: u32,
    pub target_creation: DateTime<Utc>,
    pub target_creator: [u8; 4],
    pub target_type: [u8; 4],
    /// Directory levels from alias to root, usually -1.
    pub dirs_alias_to_root: i16,
    /// Directory levels from root to target, usually -1.
    pub dirs_root_to_target: i16,
    pub volume_attributes: u32,
    pub volume_id: u16,
    /// CNID of every path component, root first.
    pub cnid_path: Vec<u32>,
    /// Path components from the volume root to the target.
    pub path_items: Vec<String>,
    /// Mount point carried by extension tag 19, typically "/".
    pub mount_point: String,
}

impl Default for AliasRecord {
    fn default() -> Self {
        Self {
            app_code: [0; 4],
            version: 2,
            kind: KIND_FILE,
            volume_name: String::new(),
            volume_date: date::hfs_epoch(),
            filesystem: "H+".to_string(),
            disk_type: DISK_TYPE_FIXED,
            folder_cnid: 0,
            target_name: String::new(),
            target_cnid: 0,
            target_creation: date::hfs_epoch(),
            target_creator: [0; 4],
            target_type: [0; 4],
            dirs_alias_to_root: -1,
            dirs_root_to_target: -1,
            volume_attributes: 0,
            volume_id: 0,
            cnid_path: Vec::new(),
            path_items: Vec::new(),
            mount_point: "/".to_string(),
        }
    }
}

/// Replaces each `/` with colon plus NUL.
pub fn carbonize(s: &str) -> String {
    s.replace('/', ":\0")
}

fn decarbonize(s: &str) -> String {
    s.replace(":\0", "/")
}

/// One length byte, the string, zero padding to `width`. Longer input is
/// truncated without error.
fn put_pascal(buf: &mut Vec<u8>, s: &str, width: usize) {
    let bytes = s.as_bytes();
    let take = bytes.len().min(width - 1);
    buf.push(take as u8);
    buf.extend_from_slice(&bytes[..take]);
    buf.resize(buf.len() + (width - 1 - take), 0);
}

fn read_pascal(block: &[u8]) -> Result<String> {
    let len = (block[0] as usize).min(block.len() - 1);
    let s = std::str::from_utf8(&block[1..1 + len]).map_err(|_| Error::InvalidString)?;
    Ok(decarbonize(s))
}

fn put_extension(buf: &mut Vec<u8>, tag: u16, payload: &[u8]) -> Result<()> {
    let length = u16::try_from(payload.len())
        .map_err(|_| Error::EncodingOverflow("extension payload exceeds u16"))?;
    buf.write_u16::<BE>(tag)?;
    buf.write_u16::<BE>(length)?;
    buf.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        buf.push(0);
    }
    Ok(())
}

/// Char count, then UTF-16 BE code units of the carbonised name.
fn unicode_payload(s: &str) -> Result<Vec<u8>> {
    let units: Vec<u16> = carbonize(s).encode_utf16().collect();
    let count = u16::try_from(units.len())
        .map_err(|_| Error::EncodingOverflow("unicode name exceeds u16 chars"))?;
    let mut payload = Vec::with_capacity(2 + units.len() * 2);
    payload.write_u16::<BE>(count)?;
    for unit in units {
        payload.write_u16::<BE>(unit)?;
    }
    Ok(payload)
}

fn decode_unicode(payload: &[u8]) -> Result<String> {
    if payload.len() < 2 {
        return Err(Error::TruncatedValue);
    }
    let count = BE::read_u16(&payload[..2]) as usize;
    if payload.len() < 2 + count * 2 {
        return Err(Error::TruncatedValue);
    }
    let units: Vec<u16> = (0..count)
        .map(|i| BE::read_u16(&payload[2 + i * 2..4 + i * 2]))
        .collect();
    let s = String::from_utf16(&units).map_err(|_| Error::InvalidString)?;
    Ok(decarbonize(&s))
}

impl AliasRecord {
    /// Name of the directory containing the target, when the path is
    /// deep enough to know it.
    fn containing_folder_name(&self) -> Option<&str> {
        if self.path_items.len() >= 2 {
            Some(&self.path_items[self.path_items.len() - 2])
        } else {
            None
        }
    }

    /// Encodes the record. Bytes 4 and 5 carry the total length of the
    /// returned buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(PREFIX_SIZE + 128);

        buf.extend_from_slice(&self.app_code);
        // Record length, patched once the full size is known.
        buf.write_u16::<BE>(0)?;
        buf.write_u16::<BE>(self.version)?;
        buf.write_u16::<BE>(self.kind)?;
        put_pascal(&mut buf, &carbonize(&self.volume_name), VOLUME_NAME_WIDTH);
        buf.write_u32::<BE>(date::hfs_seconds(self.volume_date))?;
        let mut signature = [0u8; 2];
        for (i, b) in self.filesystem.as_bytes().iter().take(2).enumerate() {
            signature[i] = *b;
        }
        buf.extend_from_slice(&signature);
        buf.write_u16::<BE>(self.disk_type)?;
        buf.write_u32::<BE>(self.folder_cnid)?;
        put_pascal(&mut buf, &carbonize(&self.target_name), TARGET_NAME_WIDTH);
        buf.write_u32::<BE>(self.target_cnid)?;
        buf.write_u32::<BE>(date::hfs_seconds(self.target_creation))?;
        buf.extend_from_slice(&self.target_creator);
        buf.extend_from_slice(&self.target_type);
        buf.write_i16::<BE>(self.dirs_alias_to_root)?;
        buf.write_i16::<BE>(self.dirs_root_to_target)?;
        buf.write_u32::<BE>(self.volume_attributes)?;
        buf.write_u16::<BE>(self.volume_id)?;
        buf.extend_from_slice(&[0u8; 10]);
        debug_assert_eq!(buf.len(), PREFIX_SIZE);

        if let Some(folder) = self.containing_folder_name() {
            put_extension(&mut buf, TAG_CARBON_FOLDER_NAME, carbonize(folder).as_bytes())?;
        }
        put_extension(
            &mut buf,
            TAG_HIGH_RES_VOLUME_CREATION_DATE,
            &date::hfs_fixed(self.volume_date).to_be_bytes(),
        )?;
        put_extension(
            &mut buf,
            TAG_HIGH_RES_CREATION_DATE,
            &date::hfs_fixed(self.target_creation).to_be_bytes(),
        )?;
        if !self.cnid_path.is_empty() {
            let mut payload = Vec::with_capacity(self.cnid_path.len() * 4);
            for cnid in &self.cnid_path {
                payload.write_u32::<BE>(*cnid)?;
            }
            put_extension(&mut buf, TAG_CNID_PATH, &payload)?;
        }
        if !self.path_items.is_empty() {
            let carbon_path = format!(
                "{}:{}",
                carbonize(&self.volume_name),
                carbonize(&self.path_items.join("/"))
            );
            put_extension(&mut buf, TAG_CARBON_PATH, carbon_path.as_bytes())?;
        }
        if !self.target_name.is_empty() {
            put_extension(&mut buf, TAG_UNICODE_FILENAME, &unicode_payload(&self.target_name)?)?;
        }
        if !self.volume_name.is_empty() {
            put_extension(
                &mut buf,
                TAG_UNICODE_VOLUME_NAME,
                &unicode_payload(&self.volume_name)?,
            )?;
        }
        if !self.path_items.is_empty() {
            put_extension(&mut buf, TAG_POSIX_PATH, self.path_items.join("/").as_bytes())?;
        }
        if !self.mount_point.is_empty() {
            put_extension(
                &mut buf,
                TAG_POSIX_PATH_TO_MOUNTPOINT,
                self.mount_point.as_bytes(),
            )?;
        }
        buf.write_u16::<BE>(TAG_SENTINEL)?;
        buf.write_u16::<BE>(0)?;

        let total = u16::try_from(buf.len())
            .map_err(|_| Error::EncodingOverflow("alias record exceeds u16 length"))?;
        BE::write_u16(&mut buf[4..6], total);
        Ok(buf)
    }

    /// Decodes a record, reading the fixed prefix and every recognised
    /// extension tag. Unknown tags are skipped.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < PREFIX_SIZE {
            return Err(Error::BadHeader("buffer shorter than alias record prefix"));
        }

        let mut record = AliasRecord::default();
        record.app_code.copy_from_slice(&data[0..4]);
        let _record_length = BE::read_u16(&data[4..6]);
        record.version = BE::read_u16(&data[6..8]);
        if record.version != 2 {
            return Err(Error::BadHeader("unsupported alias record version"));
        }
        record.kind = BE::read_u16(&data[8..10]);
        record.volume_name = read_pascal(&data[10..38])?;
        record.volume_date = date::from_hfs_seconds(BE::read_u32(&data[38..42]));
        let signature_end = data[42..44].iter().position(|b| *b == 0).unwrap_or(2);
        record.filesystem = std::str::from_utf8(&data[42..42 + signature_end])
            .map_err(|_| Error::InvalidString)?
            .to_string();
        record.disk_type = BE::read_u16(&data[44..46]);
        record.folder_cnid = BE::read_u32(&data[46..50]);
        record.target_name = read_pascal(&data[50..114])?;
        record.target_cnid = BE::read_u32(&data[114..118]);
        record.target_creation = date::from_hfs_seconds(BE::read_u32(&data[118..122]));
        record.target_creator.copy_from_slice(&data[122..126]);
        record.target_type.copy_from_slice(&data[126..130]);
        record.dirs_alias_to_root = BE::read_i16(&data[130..132]);
        record.dirs_root_to_target = BE::read_i16(&data[132..134]);
        record.volume_attributes = BE::read_u32(&data[134..138]);
        record.volume_id = BE::read_u16(&data[138..140]);
        // 10 reserved bytes close the prefix.
        record.mount_point = String::new();

        let mut offset = PREFIX_SIZE;
        while offset + 4 <= data.len() {
            let tag = BE::read_u16(&data[offset..offset + 2]);
            if tag == TAG_SENTINEL {
                break;
            }
            let length = BE::read_u16(&data[offset + 2..offset + 4]) as usize;
            offset += 4;
            let payload = data
                .get(offset..offset + length)
                .ok_or(Error::TruncatedValue)?;
            offset += length + (length % 2);

            match tag {
                TAG_CNID_PATH => {
                    if length % 4 != 0 {
                        return Err(Error::TruncatedValue);
                    }
                    record.cnid_path = payload
                        .chunks_exact(4)
                        .map(BE::read_u32)
                        .collect();
                }
                TAG_UNICODE_FILENAME => record.target_name = decode_unicode(payload)?,
                TAG_UNICODE_VOLUME_NAME => record.volume_name = decode_unicode(payload)?,
                TAG_HIGH_RES_VOLUME_CREATION_DATE => {
                    if length != 8 {
                        return Err(Error::TruncatedValue);
                    }
                    record.volume_date = date::from_hfs_fixed(BE::read_u64(payload));
                }
                TAG_HIGH_RES_CREATION_DATE => {
                    if length != 8 {
                        return Err(Error::TruncatedValue);
                    }
                    record.target_creation = date::from_hfs_fixed(BE::read_u64(payload));
                }
                TAG_POSIX_PATH => {
                    let path = std::str::from_utf8(payload).map_err(|_| Error::InvalidString)?;
                    record.path_items = path.split('/').map(String::from).collect();
                }
                TAG_POSIX_PATH_TO_MOUNTPOINT => {
                    record.mount_point = std::str::from_utf8(payload)
                        .map_err(|_| Error::InvalidString)?
                        .to_string();
                }
                TAG_CARBON_FOLDER_NAME | TAG_CARBON_PATH => {
                    // Recomputed from the path items on encode.
                }
                _ => {
                    log::debug!("ignoring alias extension tag {tag}");
                }
            }
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        chrono::TimeZone,
    };

    fn cocoa_go_record() -> AliasRecord {
        AliasRecord {
            cnid_path: vec![
                0x669dc, 0x9b7c3, 0x105f25, 0x12fe65, 0x13053d, 0x1f86ca, 0x1fe5c4, 0x7dc0f5,
            ],
            path_items: [
                "Users",
                "mattetti",
                "Code",
                "golang",
                "src",
                "github.com",
                "mattetti",
                "cocoa",
                "cocoa.go",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            kind: KIND_FILE,
            volume_name: "Macintosh HD".to_string(),
            volume_date: Utc.timestamp_opt(1_485_817_123, 0).unwrap(),
            folder_cnid: 0x1fe5c4,
            target_name: "cocoa.go".to_string(),
            target_cnid: 0x7dc0f5,
            target_creation: Utc.timestamp_opt(1_497_718_203, 0).unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn prefix_layout_matches_the_documented_offsets() {
        let record = cocoa_go_record();
        let bytes = record.to_bytes().unwrap();

        assert_eq!(&bytes[0..4], &[0, 0, 0, 0]);
        assert_eq!(&bytes[6..8], &2u16.to_be_bytes());
        assert_eq!(&bytes[8..10], &KIND_FILE.to_be_bytes());
        // Pascal volume name padded to 28 bytes.
        assert_eq!(bytes[10], 12);
        assert_eq!(&bytes[11..23], b"Macintosh HD");
        assert!(bytes[23..38].iter().all(|b| *b == 0));
        assert_eq!(&bytes[42..44], b"H+");
        assert_eq!(&bytes[46..50], &0x1fe5c4u32.to_be_bytes());
        // Pascal target name padded to 64 bytes.
        assert_eq!(bytes[50], 8);
        assert_eq!(&bytes[51..59], b"cocoa.go");
        assert!(bytes[59..114].iter().all(|b| *b == 0));
        assert_eq!(&bytes[114..118], &0x7dc0f5u32.to_be_bytes());
        assert_eq!(&bytes[130..132], &(-1i16).to_be_bytes());
        assert_eq!(&bytes[132..134], &(-1i16).to_be_bytes());
        assert!(bytes[140..150].iter().all(|b| *b == 0));
    }

    #[test]
    fn length_bytes_carry_the_total_record_size() {
        let bytes = cocoa_go_record().to_bytes().unwrap();
        let declared = u16::from_be_bytes(bytes[4..6].try_into().unwrap());
        assert_eq!(declared as usize, bytes.len());
    }

    #[test]
    fn record_ends_with_the_sentinel() {
        let bytes = cocoa_go_record().to_bytes().unwrap();
        assert_eq!(&bytes[bytes.len() - 4..], &[0xff, 0xff, 0, 0]);
    }

    #[test]
    fn carbonize_swaps_separators_for_colon_nul() {
        assert_eq!(carbonize("a/b").as_bytes(), &[b'a', 0x3a, 0x00, b'b']);
        assert_eq!(carbonize("no separators"), "no separators");
    }

    #[test]
    fn pascal_fields_are_exactly_sized() {
        let record = AliasRecord {
            volume_name: "a volume name that is clearly longer than its field".to_string(),
            target_name: "target".to_string(),
            ..Default::default()
        };
        let bytes = record.to_bytes().unwrap();
        // Truncated to 27 content bytes, field still 28 wide.
        assert_eq!(bytes[10], 27);
        assert_eq!(&bytes[42..44], b"H+");
        assert_eq!(bytes[50], 6);
    }

    #[test]
    fn high_res_dates_are_scaled_fixed_point() {
        let record = AliasRecord {
            volume_date: Utc.timestamp_opt(1_485_817_123, 0).unwrap(),
            target_creation: Utc.timestamp_opt(1_497_718_203, 0).unwrap(),
            ..Default::default()
        };
        let bytes = record.to_bytes().unwrap();

        // No path items, so the first extension is the volume date tag.
        assert_eq!(&bytes[150..152], &16u16.to_be_bytes());
        assert_eq!(&bytes[152..154], &8u16.to_be_bytes());
        let payload = u64::from_be_bytes(bytes[154..162].try_into().unwrap());
        assert_eq!(payload % 65536, 0);
        assert_eq!(payload, crate::date::hfs_fixed(record.volume_date));
        assert_eq!(&bytes[162..164], &17u16.to_be_bytes());
    }

    #[test]
    fn encode_parse_round_trip() {
        let record = cocoa_go_record();
        let parsed = AliasRecord::parse(&record.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn names_with_separators_survive_carbonisation() {
        let record = AliasRecord {
            target_name: "odd/name".to_string(),
            volume_name: "vol".to_string(),
            path_items: vec!["vol".to_string(), "odd/name".to_string()],
            ..Default::default()
        };
        let bytes = record.to_bytes().unwrap();
        let parsed = AliasRecord::parse(&bytes).unwrap();
        assert_eq!(parsed.target_name, "odd/name");
    }

    #[test]
    fn short_buffer_is_rejected() {
        assert!(matches!(
            AliasRecord::parse(&[0u8; 40]),
            Err(Error::BadHeader(_))
        ));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut bytes = cocoa_go_record().to_bytes().unwrap();
        bytes[7] = 3;
        assert!(matches!(
            AliasRecord::parse(&bytes),
            Err(Error::BadHeader(_))
        ));
    }
}
