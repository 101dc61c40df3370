// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! CFURL resource and volume property flags, and the 24 byte blobs that
//! carry them inside a bookmark.
//!
//! A property blob is three u64 little endian words: the flags, the mask
//! of flags that were requested, and a reserved zero.

use {
    crate::{
        error::{Error, Result},
        probe::ObjectType,
    },
    scroll::Pread,
};

// Resource property flags, from CFURLPriv.h.
pub const RESOURCE_IS_REGULAR_FILE: u64 = 0x0000_0001;
pub const RESOURCE_IS_DIRECTORY: u64 = 0x0000_0002;
pub const RESOURCE_IS_SYMBOLIC_LINK: u64 = 0x0000_0004;
pub const RESOURCE_IS_VOLUME: u64 = 0x0000_0008;
pub const RESOURCE_IS_PACKAGE: u64 = 0x0000_0010;
pub const RESOURCE_IS_SYSTEM_IMMUTABLE: u64 = 0x0000_0020;
pub const RESOURCE_IS_USER_IMMUTABLE: u64 = 0x0000_0040;
pub const RESOURCE_IS_HIDDEN: u64 = 0x0000_0080;
pub const RESOURCE_HAS_HIDDEN_EXTENSION: u64 = 0x0000_0100;
pub const RESOURCE_IS_APPLICATION: u64 = 0x0000_0200;
pub const RESOURCE_IS_COMPRESSED: u64 = 0x0000_0400;
pub const RESOURCE_CAN_SET_HIDDEN_EXTENSION: u64 = 0x0000_0800;
pub const RESOURCE_IS_READABLE: u64 = 0x0000_1000;
pub const RESOURCE_IS_WRITEABLE: u64 = 0x0000_2000;
pub const RESOURCE_IS_EXECUTABLE: u64 = 0x0000_4000;
pub const RESOURCE_IS_ALIAS_FILE: u64 = 0x0000_8000;
pub const RESOURCE_IS_MOUNT_TRIGGER: u64 = 0x0001_0000;

// Volume property flags, from CFURLPriv.h.
pub const VOLUME_IS_LOCAL: u64 = 0x1;
pub const VOLUME_IS_AUTOMOUNT: u64 = 0x2;
pub const VOLUME_DONT_BROWSE: u64 = 0x4;
pub const VOLUME_IS_READ_ONLY: u64 = 0x8;
pub const VOLUME_IS_QUARANTINED: u64 = 0x10;
pub const VOLUME_IS_EJECTABLE: u64 = 0x20;
pub const VOLUME_IS_REMOVABLE: u64 = 0x40;
pub const VOLUME_IS_INTERNAL: u64 = 0x80;
pub const VOLUME_IS_EXTERNAL: u64 = 0x100;
pub const VOLUME_IS_DISK_IMAGE: u64 = 0x200;
pub const VOLUME_SUPPORTS_PERSISTENT_IDS: u64 = 0x1_0000_0000;
pub const VOLUME_SUPPORTS_SEARCH_FS: u64 = 0x2_0000_0000;
pub const VOLUME_SUPPORTS_EXCHANGE: u64 = 0x4_0000_0000;
pub const VOLUME_SUPPORTS_SYMBOLIC_LINKS: u64 = 0x10_0000_0000;
pub const VOLUME_SUPPORTS_HARD_LINKS: u64 = 0x2_0000_0000_0000;
pub const VOLUME_HAS_64_BIT_OBJECT_IDS: u64 = 0x1000_0000_0000_0000;

/// The mask of file resource flags a bookmark writer asks for.
pub const FILE_PROPERTIES_REQUESTED: u64 = 0x0f;

pub const PROPERTY_BLOB_LEN: usize = 24;

/// Packs flags and the requested mask into the on-wire blob.
pub fn encode_properties(flags: u64, requested: u64) -> Vec<u8> {
    let mut blob = Vec::with_capacity(PROPERTY_BLOB_LEN);
    blob.extend_from_slice(&flags.to_le_bytes());
    blob.extend_from_slice(&requested.to_le_bytes());
    blob.extend_from_slice(&0u64.to_le_bytes());
    blob
}

/// Unpacks a blob into its flags and requested mask.
pub fn decode_properties(blob: &[u8]) -> Result<(u64, u64)> {
    if blob.len() != PROPERTY_BLOB_LEN {
        return Err(Error::TruncatedValue);
    }
    let mut offset = 0;
    let flags = blob.gread_with::<u64>(&mut offset, scroll::LE)?;
    let requested = blob.gread_with::<u64>(&mut offset, scroll::LE)?;
    Ok((flags, requested))
}

/// The file property blob a writer stores for the given object type.
pub fn file_properties_for(object_type: ObjectType) -> Vec<u8> {
    let flags = match object_type {
        ObjectType::Regular => RESOURCE_IS_REGULAR_FILE,
        ObjectType::Directory => RESOURCE_IS_DIRECTORY,
        ObjectType::Symlink => RESOURCE_IS_SYMBOLIC_LINK,
    };
    encode_properties(flags, FILE_PROPERTIES_REQUESTED)
}

/// The volume property blob written for typical fixed volumes.
pub fn default_volume_properties() -> Vec<u8> {
    encode_properties(
        0x81 | VOLUME_SUPPORTS_PERSISTENT_IDS,
        0x13ef | VOLUME_SUPPORTS_PERSISTENT_IDS,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_round_trip() {
        let blob = encode_properties(RESOURCE_IS_DIRECTORY, FILE_PROPERTIES_REQUESTED);
        assert_eq!(blob.len(), PROPERTY_BLOB_LEN);
        assert_eq!(
            decode_properties(&blob).unwrap(),
            (RESOURCE_IS_DIRECTORY, FILE_PROPERTIES_REQUESTED)
        );
        assert!(blob[16..].iter().all(|b| *b == 0));
    }

    #[test]
    fn file_properties_select_the_type_flag() {
        assert_eq!(
            decode_properties(&file_properties_for(ObjectType::Regular)).unwrap().0,
            RESOURCE_IS_REGULAR_FILE
        );
        assert_eq!(
            decode_properties(&file_properties_for(ObjectType::Symlink)).unwrap().0,
            RESOURCE_IS_SYMBOLIC_LINK
        );
    }

    #[test]
    fn short_blob_is_rejected() {
        assert!(matches!(
            decode_properties(&[0u8; 8]),
            Err(Error::TruncatedValue)
        ));
    }

    #[test]
    fn default_volume_blob_requests_persistent_ids() {
        let (flags, requested) = decode_properties(&default_volume_properties()).unwrap();
        assert_ne!(flags & VOLUME_SUPPORTS_PERSISTENT_IDS, 0);
        assert_ne!(requested & VOLUME_SUPPORTS_PERSISTENT_IDS, 0);
    }
}
