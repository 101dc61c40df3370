// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Bookmark data, the modern container behind macOS aliases.
//!
//! An encoded bookmark is `[header | body | TOC]`. The body is a
//! sequence of typed values ([crate::value]); the TOC ([crate::toc])
//! indexes the values by a closed set of 16 bit keys. Values referenced
//! from arrays must be written before the array that points at them,
//! which is why the writer emits path components first and the arrays
//! over them afterwards.
//!
//! Only TOC-indexed retrieval round-trips; the relative order of records
//! inside the body is not part of the format.

use {
    crate::{
        error::{Error, Result},
        toc::{self, Toc},
        value,
    },
    byteorder::{WriteBytesExt, LE},
    chrono::{DateTime, Utc},
    scroll::Pread,
    std::io::Write,
};

pub const KEY_PATH: u32 = 0x1004;
pub const KEY_CNID_PATH: u32 = 0x1005;
pub const KEY_FILE_PROPERTIES: u32 = 0x1010;
pub const KEY_FILE_NAME: u32 = 0x1020;
pub const KEY_FILE_ID: u32 = 0x1030;
pub const KEY_FILE_CREATION_DATE: u32 = 0x1040;
/// Under documented; written for non-root volumes, skipped on read.
pub const KEY_TOC_PATH: u32 = 0x2000;
pub const KEY_VOLUME_PATH: u32 = 0x2002;
pub const KEY_VOLUME_URL: u32 = 0x2005;
pub const KEY_VOLUME_NAME: u32 = 0x2010;
pub const KEY_VOLUME_UUID: u32 = 0x2011;
pub const KEY_VOLUME_SIZE: u32 = 0x2012;
pub const KEY_VOLUME_CREATION_DATE: u32 = 0x2013;
pub const KEY_VOLUME_PROPERTIES: u32 = 0x2020;
pub const KEY_VOLUME_IS_ROOT: u32 = 0x2030;
pub const KEY_CONTAINING_FOLDER: u32 = 0xc001;
pub const KEY_USER_NAME: u32 = 0xc011;
pub const KEY_UID: u32 = 0xc012;
pub const KEY_WAS_FILE_REFERENCE: u32 = 0xd001;
pub const KEY_CREATION_OPTIONS: u32 = 0xd010;
pub const KEY_FULL_FILE_NAME: u32 = 0xf017;
pub const KEY_FILE_TYPE: u32 = 0xf022;

/// Size of the header actually occupying the front of the stream.
pub const HEADER_SIZE: usize = 48;

/// The size the header declares for itself. Historic; readers verify the
/// two copies agree and otherwise ignore the value.
const DECLARED_HEADER_SIZE: u32 = 56;

const HEADER_MAGIC: u32 = 0x1004_0000;

/// The parsed bookmark file header.
#[derive(Clone, Copy, Debug)]
pub struct BookmarkHeader {
    pub declared_size: u32,
    /// Declared size of body plus TOC, biased by 4.
    pub total_size: u32,
    /// Locator for the TOC, biased like every stored offset.
    pub toc_offset: u32,
}

impl BookmarkHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::BadHeader("buffer shorter than header"));
        }
        if &data[0..4] != b"book" || &data[8..12] != b"mark" {
            return Err(Error::BadHeader("magic mismatch"));
        }

        let mut offset = 16;
        let size_a = data.gread_with::<u32>(&mut offset, scroll::LE)?;
        let size_b = data.gread_with::<u32>(&mut offset, scroll::LE)?;
        if size_a != size_b {
            return Err(Error::BadHeader("inconsistent header sizes"));
        }
        let total_size = data.gread_with::<u32>(&mut offset, scroll::LE)?;
        if total_size < 4 || HEADER_SIZE + (total_size as usize - 4) > data.len() {
            return Err(Error::BadHeader("declared size exceeds buffer"));
        }

        let mut offset = HEADER_SIZE - 4;
        let toc_offset = data.gread_with::<u32>(&mut offset, scroll::LE)?;

        Ok(Self {
            declared_size: size_a,
            total_size,
            toc_offset,
        })
    }

    /// Absolute position of the TOC block.
    pub fn toc_position(&self) -> Result<usize> {
        Ok(HEADER_SIZE + toc::body_offset(self.toc_offset)? as usize)
    }
}

/// Absolute position of a value referenced by a stored TOC offset.
fn value_position(stored: u32) -> Result<usize> {
    Ok(HEADER_SIZE + toc::body_offset(stored)? as usize)
}

/// Absolute position of a value referenced by an array element. Array
/// elements hold plain body offsets, without the TOC bias.
fn element_position(offset: u32) -> usize {
    HEADER_SIZE + offset as usize
}

/// A durable reference to a file, by path and by catalog node IDs.
///
/// Sequences and strings left empty and options left `None` are omitted
/// from the encoded TOC; decoding fills exactly the fields present in
/// the input.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BookmarkData {
    /// Volume relative path components, leaf last.
    pub path: Vec<String>,
    /// Catalog node ID of each path component.
    pub cnid_path: Vec<u64>,
    pub file_creation_date: Option<DateTime<Utc>>,
    /// Three u64 LE: resource property flags, flags requested, reserved.
    pub file_properties: Vec<u8>,
    /// Raw FileType blob, key 0xf022.
    pub file_type: Vec<u8>,
    /// Index of the containing directory within [Self::path].
    pub containing_folder_idx: Option<u32>,
    /// Mount point, "/" for the root volume.
    pub volume_path: String,
    pub volume_is_root: bool,
    /// "file://" plus the volume path.
    pub volume_url: String,
    pub volume_name: String,
    /// Uppercase dashed hex, or empty when unknown.
    pub volume_uuid: String,
    pub volume_size: Option<i64>,
    pub volume_creation_date: Option<DateTime<Utc>>,
    /// Three u64 LE of volume capability flags.
    pub volume_properties: Vec<u8>,
    /// 512 or 1024, both meaning suitable for a bookmark file.
    pub creation_options: Option<u32>,
    pub was_file_reference: bool,
    pub user_name: String,
    /// Leaf catalog node ID, kept for alias compatibility.
    pub cnid: Option<u32>,
    pub uid: Option<u32>,
    /// Leaf file name, duplicated from the path for robustness.
    pub filename: String,
}

impl BookmarkData {
    /// Full POSIX path to the target.
    pub fn target_path(&self) -> String {
        if self.path.is_empty() {
            return self.volume_path.clone();
        }
        let joined = self.path.join("/");
        if self.volume_path.ends_with('/') {
            format!("{}{}", self.volume_path, joined)
        } else {
            format!("{}/{}", self.volume_path, joined)
        }
    }

    /// Encodes into `[header | body | TOC]`.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        let mut toc = Toc::default();

        if let Some(options) = self.creation_options {
            toc.insert(KEY_CREATION_OPTIONS, value::emit_i32(&mut body, options as i32)?);
        }

        // Path components first so the arrays below can reference them.
        let mut component_offsets = Vec::with_capacity(self.path.len());
        let mut user_name_offset = None;
        for component in &self.path {
            let offset = value::emit_string(&mut body, component)?;
            if !self.user_name.is_empty() && component == &self.user_name {
                user_name_offset = Some(offset);
            }
            component_offsets.push(offset);
        }
        if let Some(last) = component_offsets.last() {
            toc.insert(KEY_FULL_FILE_NAME, *last);
            toc.insert(KEY_PATH, value::emit_offset_array(&mut body, &component_offsets)?);
        }

        if !self.filename.is_empty() {
            let offset = match (self.path.last(), component_offsets.last()) {
                (Some(last), Some(offset)) if *last == self.filename => *offset,
                _ => value::emit_string(&mut body, &self.filename)?,
            };
            toc.insert(KEY_FILE_NAME, offset);
        }

        if !self.cnid_path.is_empty() {
            let mut offsets = Vec::with_capacity(self.cnid_path.len());
            for cnid in &self.cnid_path {
                offsets.push(value::emit_i64(&mut body, *cnid as i64)?);
            }
            toc.insert(KEY_CNID_PATH, value::emit_offset_array(&mut body, &offsets)?);
        }

        if let Some(t) = self.file_creation_date {
            toc.insert(KEY_FILE_CREATION_DATE, value::emit_date(&mut body, t)?);
        }
        if let Some(cnid) = self.cnid {
            toc.insert(KEY_FILE_ID, value::emit_i32(&mut body, cnid as i32)?);
        }
        if !self.file_properties.is_empty() {
            toc.insert(KEY_FILE_PROPERTIES, value::emit_data(&mut body, &self.file_properties)?);
        }
        if let Some(idx) = self.containing_folder_idx {
            toc.insert(KEY_CONTAINING_FOLDER, value::emit_i32(&mut body, idx as i32)?);
        }
        if let Some(uid) = self.uid {
            toc.insert(KEY_UID, value::emit_i32(&mut body, uid as i32)?);
        }
        if !self.user_name.is_empty() {
            let offset = match user_name_offset {
                Some(offset) => offset,
                None => value::emit_string(&mut body, &self.user_name)?,
            };
            toc.insert(KEY_USER_NAME, offset);
        }

        if !self.volume_path.is_empty() {
            toc.insert(KEY_VOLUME_PATH, value::emit_string(&mut body, &self.volume_path)?);
        }
        if !self.volume_url.is_empty() {
            toc.insert(KEY_VOLUME_URL, value::emit_url(&mut body, true, &self.volume_url)?);
        }
        if !self.volume_name.is_empty() {
            toc.insert(KEY_VOLUME_NAME, value::emit_string(&mut body, &self.volume_name)?);
        }
        if !self.volume_uuid.is_empty() {
            toc.insert(KEY_VOLUME_UUID, value::emit_string(&mut body, &self.volume_uuid)?);
        }
        if let Some(size) = self.volume_size {
            toc.insert(KEY_VOLUME_SIZE, value::emit_i64(&mut body, size)?);
        }
        if let Some(t) = self.volume_creation_date {
            toc.insert(KEY_VOLUME_CREATION_DATE, value::emit_date(&mut body, t)?);
        }
        if !self.volume_properties.is_empty() {
            toc.insert(
                KEY_VOLUME_PROPERTIES,
                value::emit_data(&mut body, &self.volume_properties)?,
            );
        }
        toc.insert(KEY_VOLUME_IS_ROOT, value::emit_bool(&mut body, self.volume_is_root)?);
        toc.insert(
            KEY_WAS_FILE_REFERENCE,
            value::emit_bool(&mut body, self.was_file_reference)?,
        );

        if !self.file_type.is_empty() {
            toc.insert(KEY_FILE_TYPE, value::emit_data(&mut body, &self.file_type)?);
        }

        // Best effort for non-root volumes: an array over the path
        // component strings already present in the body.
        if cfg!(feature = "toc-path") && !self.volume_is_root && !component_offsets.is_empty() {
            toc.insert(KEY_TOC_PATH, value::emit_offset_array(&mut body, &component_offsets)?);
        }

        let toc_bytes = toc.to_bytes()?;
        assemble(&body, &toc_bytes)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes()?)?;
        Ok(())
    }

    /// Decodes an in-memory bookmark. Malformed headers, TOCs and values
    /// are fatal; unrecognised keys are skipped.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = BookmarkHeader::parse(data)?;
        let entries = Toc::parse(data, header.toc_position()?)?;

        let mut bookmark = BookmarkData::default();
        for (key, stored) in &entries {
            let position = value_position(*stored)?;
            match *key {
                KEY_PATH => {
                    let offsets = value::decode_offset_array(data, position)?;
                    bookmark.path = offsets
                        .iter()
                        .map(|offset| value::decode_string(data, element_position(*offset)))
                        .collect::<Result<Vec<_>>>()?;
                }
                KEY_CNID_PATH => {
                    let offsets = value::decode_offset_array(data, position)?;
                    bookmark.cnid_path = offsets
                        .iter()
                        .map(|offset| {
                            value::decode_i64(data, element_position(*offset)).map(|n| n as u64)
                        })
                        .collect::<Result<Vec<_>>>()?;
                }
                KEY_FILE_PROPERTIES => {
                    bookmark.file_properties = value::decode_data(data, position)?;
                }
                KEY_FILE_NAME => {
                    bookmark.filename = value::decode_string(data, position)?;
                }
                KEY_FILE_ID => {
                    bookmark.cnid = Some(value::decode_i32(data, position)? as u32);
                }
                KEY_FILE_CREATION_DATE => {
                    bookmark.file_creation_date = Some(value::decode_date(data, position)?);
                }
                KEY_VOLUME_PATH => {
                    bookmark.volume_path = value::decode_string(data, position)?;
                }
                KEY_VOLUME_URL => {
                    let (_absolute, url) = value::decode_url(data, position)?;
                    bookmark.volume_url = url;
                }
                KEY_VOLUME_NAME => {
                    bookmark.volume_name = value::decode_string(data, position)?;
                }
                KEY_VOLUME_UUID => {
                    bookmark.volume_uuid = value::decode_string(data, position)?;
                }
                KEY_VOLUME_SIZE => {
                    bookmark.volume_size = Some(value::decode_i64(data, position)?);
                }
                KEY_VOLUME_CREATION_DATE => {
                    bookmark.volume_creation_date = Some(value::decode_date(data, position)?);
                }
                KEY_VOLUME_PROPERTIES => {
                    bookmark.volume_properties = value::decode_data(data, position)?;
                }
                KEY_VOLUME_IS_ROOT => {
                    bookmark.volume_is_root = value::decode_bool(data, position)?;
                }
                KEY_CONTAINING_FOLDER => {
                    bookmark.containing_folder_idx =
                        Some(value::decode_i32(data, position)? as u32);
                }
                KEY_USER_NAME => {
                    bookmark.user_name = value::decode_string(data, position)?;
                }
                KEY_UID => {
                    bookmark.uid = Some(value::decode_i32(data, position)? as u32);
                }
                KEY_WAS_FILE_REFERENCE => {
                    bookmark.was_file_reference = value::decode_bool(data, position)?;
                }
                KEY_CREATION_OPTIONS => {
                    bookmark.creation_options = Some(value::decode_i32(data, position)? as u32);
                }
                KEY_FULL_FILE_NAME => {
                    // Redundant with the leaf path component; validated
                    // but the file name round-trips through 0x1020.
                    value::decode_string(data, position)?;
                }
                KEY_FILE_TYPE => {
                    bookmark.file_type = value::decode_data(data, position)?;
                }
                KEY_TOC_PATH => {
                    log::debug!("skipping under documented TocPath entry");
                }
                _ => {
                    log::debug!("ignoring unrecognised TOC key {key:#06x}");
                }
            }
        }

        Ok(bookmark)
    }
}

/// Emits the header and concatenates body and TOC behind it.
fn assemble(body: &[u8], toc_bytes: &[u8]) -> Result<Vec<u8>> {
    let body_len = u32::try_from(body.len())
        .map_err(|_| Error::EncodingOverflow("body exceeds 4 GiB"))?;
    let toc_len = u32::try_from(toc_bytes.len())
        .map_err(|_| Error::EncodingOverflow("TOC exceeds 4 GiB"))?;
    let total = body_len
        .checked_add(toc_len)
        .and_then(|n| n.checked_add(4))
        .ok_or(Error::EncodingOverflow("bookmark exceeds 4 GiB"))?;

    let mut out = Vec::with_capacity(HEADER_SIZE + body.len() + toc_bytes.len());
    out.extend_from_slice(b"book");
    out.write_u32::<LE>(0)?;
    out.extend_from_slice(b"mark");
    out.write_u32::<LE>(0)?;
    out.write_u32::<LE>(DECLARED_HEADER_SIZE)?;
    out.write_u32::<LE>(DECLARED_HEADER_SIZE)?;
    out.write_u32::<LE>(total)?;
    out.write_u32::<LE>(HEADER_MAGIC)?;
    out.write_u64::<LE>(0)?;
    out.write_u32::<LE>(0)?;
    out.write_u32::<LE>(toc::wire_offset(body_len))?;
    out.extend_from_slice(body);
    out.extend_from_slice(toc_bytes);
    Ok(out)
}
