// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The seam between the codecs and the filesystem.
//!
//! The codecs never touch the filesystem themselves. Platform glue
//! implements [FilesystemProbe] (on macOS via getattrlist and setxattr)
//! and feeds the results into [crate::BookmarkData::from_filesystem_info];
//! on the way out, glue marks the written file as an alias by setting
//! [FINDER_INFO_XATTR] to [ALIAS_FINDER_INFO].

use {
    crate::{bookmark::BookmarkData, properties},
    chrono::{DateTime, Utc},
    std::{io, path::Path},
};

/// Finder flag bit marking a file as an alias.
pub const FINDER_FLAG_IS_ALIAS: u16 = 0x8000;

/// Extended attribute the Finder stores its info blob under.
pub const FINDER_INFO_XATTR: &str = "com.apple.FinderInfo";

/// The 32 byte Finder info blob that flags a file as an alias:
/// "alisMACS", the alias flag byte, then zeros.
pub const ALIAS_FINDER_INFO: [u8; 32] = [
    0x61, 0x6c, 0x69, 0x73, 0x4d, 0x41, 0x43, 0x53, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

/// Whether a file's Finder flags mark it as an existing alias.
pub fn is_alias_flagged(finder_flags: u16) -> bool {
    finder_flags & FINDER_FLAG_IS_ALIAS != 0
}

/// Kind of filesystem object a probe saw.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ObjectType {
    Regular,
    Directory,
    Symlink,
}

/// Volume attributes needed to populate a bookmark.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeInfo {
    /// Mount point, "/" for the root volume.
    pub mount_point: String,
    pub fs_type: String,
    pub name: String,
    pub uuid: [u8; 16],
    pub size_bytes: i64,
    pub created: DateTime<Utc>,
}

impl VolumeInfo {
    /// The UUID in the representation bookmarks store.
    pub fn uuid_string(&self) -> String {
        format_volume_uuid(self.uuid)
    }
}

/// Per file attributes needed to populate a bookmark.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FileInfo {
    pub object_type: ObjectType,
    pub finder_flags: u16,
    pub inode: u64,
    pub created: DateTime<Utc>,
}

/// Filesystem introspection the codecs depend on but do not implement.
pub trait FilesystemProbe {
    /// Attributes of the volume holding `path`.
    fn volume_info(&self, path: &Path) -> io::Result<VolumeInfo>;

    /// Attributes of the object at `path`.
    fn file_info(&self, path: &Path, follow_symlinks: bool) -> io::Result<FileInfo>;

    /// `(component, inode)` pairs from the volume root down to `path`.
    fn ancestors(&self, path: &Path) -> io::Result<Vec<(String, u64)>>;

    /// Flags a written bookmark file as an alias.
    fn mark_alias(&self, path: &Path) -> io::Result<()>;
}

/// Formats 16 raw UUID bytes the way bookmarks store volume UUIDs:
/// uppercase hex, dashed 8-4-4-4-12.
pub fn format_volume_uuid(uuid: [u8; 16]) -> String {
    let hex = hex::encode_upper(uuid);
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

impl BookmarkData {
    /// Assembles a bookmark from probe results, without touching the
    /// filesystem. `ancestors` runs from the volume root to the target
    /// leaf, as [FilesystemProbe::ancestors] returns it.
    pub fn from_filesystem_info(
        volume: &VolumeInfo,
        file: &FileInfo,
        ancestors: &[(String, u64)],
        user_name: &str,
        uid: u32,
    ) -> Self {
        let path: Vec<String> = ancestors.iter().map(|(name, _)| name.clone()).collect();
        let cnid_path: Vec<u64> = ancestors.iter().map(|(_, inode)| *inode).collect();
        let containing_folder_idx = (path.len() >= 2).then(|| path.len() as u32 - 2);
        let filename = path.last().cloned().unwrap_or_default();

        BookmarkData {
            path,
            cnid_path,
            file_creation_date: Some(file.created),
            file_properties: properties::file_properties_for(file.object_type),
            containing_folder_idx,
            volume_path: volume.mount_point.clone(),
            volume_is_root: volume.mount_point == "/",
            volume_url: format!("file://{}", volume.mount_point),
            volume_name: volume.name.clone(),
            volume_uuid: volume.uuid_string(),
            volume_size: Some(volume.size_bytes),
            volume_creation_date: Some(volume.created),
            volume_properties: properties::default_volume_properties(),
            creation_options: Some(512),
            was_file_reference: true,
            user_name: user_name.to_string(),
            cnid: Some(file.inode as u32),
            uid: Some(uid),
            filename,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, chrono::TimeZone};

    #[test]
    fn alias_flag_detection() {
        assert!(is_alias_flagged(0x8000));
        assert!(is_alias_flagged(0x8001));
        assert!(!is_alias_flagged(0x4000));
    }

    #[test]
    fn finder_info_blob_shape() {
        assert_eq!(ALIAS_FINDER_INFO.len(), 32);
        assert_eq!(&ALIAS_FINDER_INFO[..8], b"alisMACS");
        assert_eq!(ALIAS_FINDER_INFO[8], 0x80);
        assert!(ALIAS_FINDER_INFO[9..].iter().all(|b| *b == 0));
    }

    #[test]
    fn uuid_formatting_is_uppercase_and_dashed() {
        let uuid = [
            0xde, 0xad, 0xbe, 0xef, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99,
            0xaa, 0xbb,
        ];
        assert_eq!(format_volume_uuid(uuid), "DEADBEEF-0011-2233-4455-66778899AABB");
    }

    #[test]
    fn bookmark_assembly_from_probe_results() {
        let volume = VolumeInfo {
            mount_point: "/".to_string(),
            fs_type: "apfs".to_string(),
            name: "Macintosh HD".to_string(),
            uuid: [0; 16],
            size_bytes: 250_000_000_000,
            created: Utc.timestamp_opt(1_400_000_000, 0).unwrap(),
        };
        let file = FileInfo {
            object_type: ObjectType::Regular,
            finder_flags: 0,
            inode: 0x8a2406,
            created: Utc.timestamp_opt(1_500_000_000, 0).unwrap(),
        };
        let ancestors = vec![
            ("Users".to_string(), 0x669dc),
            ("mattetti".to_string(), 0x9b7c3),
            ("notes.txt".to_string(), 0x8a2406),
        ];

        let bookmark =
            BookmarkData::from_filesystem_info(&volume, &file, &ancestors, "mattetti", 501);
        assert_eq!(bookmark.path, vec!["Users", "mattetti", "notes.txt"]);
        assert_eq!(bookmark.cnid_path, vec![0x669dc, 0x9b7c3, 0x8a2406]);
        assert_eq!(bookmark.containing_folder_idx, Some(1));
        assert_eq!(bookmark.filename, "notes.txt");
        assert!(bookmark.volume_is_root);
        assert_eq!(bookmark.volume_url, "file:///");
        assert_eq!(bookmark.creation_options, Some(512));
        assert_eq!(bookmark.cnid, Some(0x8a2406));

        // The assembled value encodes and round-trips like any other.
        let decoded = BookmarkData::parse(&bookmark.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, bookmark);
    }
}
