// The 32-byte short-name directory entry codec.
//
// On-disk layout: name[0..11], attribute[11], reserved[12], creation time
// tenths[13], creation time[14..16], creation date[16..18], last access
// date[18..20], cluster high[20..22], write time[22..24], write date[24..26],
// cluster low[26..28], size[28..32]. Reserved and creation/access fields are
// zeroed on every encode.

use chrono::{DateTime, Datelike, Local, Timelike};
use fatmod_core::FatError;

use crate::constants::*;
use crate::image::FsImage;

/// A decoded directory entry. `offset` is the absolute byte offset of the
/// 32-byte record within the image and serves as its persistence identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub attribute: u8,
    pub write_time: u16,
    pub write_date: u16,
    pub cluster: u32,
    pub size: u32,
    pub offset: u64,
    /// Raw first byte of the on-disk name; free/last-free classification must
    /// not depend on the filtered presentation name.
    first_name_byte: u8,
}

impl DirEntry {
    /// An entry that exists only in memory (root, the current directory).
    /// It is never encoded back to the image.
    pub fn synthesized(name: String, attribute: u8, cluster: u32) -> Self {
        let first_name_byte = name.as_bytes().first().copied().unwrap_or(0);
        Self {
            name,
            attribute,
            write_time: 0,
            write_date: 0,
            cluster,
            size: 0,
            offset: 0,
            first_name_byte,
        }
    }

    /// A fresh record destined for the slot at `offset`.
    pub(crate) fn new_at(
        name: String,
        attribute: u8,
        cluster: u32,
        offset: u64,
        write_date: u16,
        write_time: u16,
    ) -> Self {
        let first_name_byte = name.as_bytes().first().copied().unwrap_or(0);
        Self {
            name,
            attribute,
            write_time,
            write_date,
            cluster,
            size: 0,
            offset,
            first_name_byte,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.attribute & ATTR_DIRECTORY != 0
    }

    pub fn is_file(&self) -> bool {
        self.attribute & ATTR_DIRECTORY == 0
    }

    pub fn is_long_name(&self) -> bool {
        self.attribute & ATTR_LONG_NAME == ATTR_LONG_NAME
    }

    pub fn is_free(&self) -> bool {
        self.first_name_byte == LAST_FREE_ENTRY || self.first_name_byte == FREE_ENTRY
    }
}

/// Decode the 32-byte record at `offset`.
pub fn decode_entry(image: &FsImage, offset: u64) -> Result<DirEntry, FatError> {
    let mut raw = [0u8; 11];
    raw.copy_from_slice(image.read_bytes(offset, 11)?);
    let attribute = image.read_u8(offset + 11)?;
    let high = image.read_u16(offset + 20)?;
    let write_time = image.read_u16(offset + 22)?;
    let write_date = image.read_u16(offset + 24)?;
    let low = image.read_u16(offset + 26)?;
    let size = image.read_u32(offset + 28)?;

    Ok(DirEntry {
        name: from_short_name(&raw),
        attribute,
        write_time,
        write_date,
        cluster: form_cluster(high, low),
        size,
        offset,
        first_name_byte: raw[0],
    })
}

/// Encode `entry` at its recorded offset, deriving the short name from the
/// presentation name.
pub fn encode_entry(image: &mut FsImage, entry: &DirEntry) -> Result<(), FatError> {
    encode_at(image, entry, &to_short_name(&entry.name))
}

/// Rewrite `entry` as a last-free slot: first name byte 0x00, blank name,
/// attribute/cluster/size preserved so the record stays recoverable.
pub fn encode_deleted(image: &mut FsImage, entry: &DirEntry) -> Result<(), FatError> {
    let mut name = [SHORT_NAME_PAD; 11];
    name[0] = LAST_FREE_ENTRY;
    encode_at(image, entry, &name)
}

fn encode_at(image: &mut FsImage, entry: &DirEntry, short_name: &[u8; 11]) -> Result<(), FatError> {
    let at = entry.offset;
    image.write_bytes(short_name, at)?;
    image.write_u8(entry.attribute, at + 11)?;
    // Reserved byte, creation time tenths, creation time/date, access date.
    image.write_u8(0, at + 12)?;
    image.write_u8(0, at + 13)?;
    image.write_u16(0, at + 14)?;
    image.write_u16(0, at + 16)?;
    image.write_u16(0, at + 18)?;
    image.write_u16((entry.cluster >> 16) as u16, at + 20)?;
    image.write_u16(entry.write_time, at + 22)?;
    image.write_u16(entry.write_date, at + 24)?;
    image.write_u16((entry.cluster & 0xFFFF) as u16, at + 26)?;
    image.write_u32(entry.size, at + 28)?;
    Ok(())
}

pub fn form_cluster(high: u16, low: u16) -> u32 {
    (high as u32) << 16 | low as u32
}

/// Presentation form to the 11-byte 8.3 layout: uppercase, split on the
/// first dot, space-padded. `.` and `..` encode literally.
pub fn to_short_name(name: &str) -> [u8; 11] {
    let mut short = [SHORT_NAME_PAD; 11];
    if name == "." || name == ".." {
        for (i, b) in name.bytes().enumerate() {
            short[i] = b;
        }
        return short;
    }

    match name.find('.') {
        Some(dot) => {
            for (i, b) in name[..dot].bytes().take(8).enumerate() {
                short[i] = b.to_ascii_uppercase();
            }
            for (i, b) in name[dot + 1..].bytes().take(3).enumerate() {
                short[8 + i] = b.to_ascii_uppercase();
            }
        }
        None => {
            for (i, b) in name.bytes().take(11).enumerate() {
                short[i] = b.to_ascii_uppercase();
            }
        }
    }
    short
}

/// The 11 raw name bytes to presentation form: keep printable bytes, insert a
/// dot at the first space run when an extension follows, lowercase.
pub fn from_short_name(raw: &[u8; 11]) -> String {
    let mut name = String::new();
    let mut pending_dot = false;
    for &b in raw {
        if !(b.is_ascii_alphanumeric() || b.is_ascii_punctuation() || b == SHORT_NAME_PAD) {
            continue;
        }
        if b == SHORT_NAME_PAD {
            pending_dot = true;
        } else {
            if pending_dot {
                name.push('.');
                pending_dot = false;
            }
            name.push(b.to_ascii_lowercase() as char);
        }
    }
    name
}

/// Pack a wall-clock moment into the DOS write date/time words:
/// date = day | month << 5 | (year - 1980) << 9,
/// time = sec/2 | min << 5 | hour << 11.
pub fn pack_datetime(dt: &DateTime<Local>) -> (u16, u16) {
    let date = ((dt.year() - 1980) as u16) << 9 | (dt.month() as u16) << 5 | dt.day() as u16;
    let time =
        (dt.hour() as u16) << 11 | (dt.minute() as u16) << 5 | ((dt.second() / 2).min(29) as u16);
    (date, time)
}

/// Current local time in DOS packed form.
pub fn now_datetime() -> (u16, u16) {
    pack_datetime(&Local::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn short_name_round_trips() {
        for name in ["a.txt", "readme.md", "big", "undel.1", "x", "longname.ext"] {
            assert_eq!(from_short_name(&to_short_name(name)), name);
        }
    }

    #[test]
    fn dot_entries_round_trip() {
        assert_eq!(to_short_name("."), *b".          ");
        assert_eq!(to_short_name(".."), *b"..         ");
        assert_eq!(from_short_name(b".          "), ".");
        assert_eq!(from_short_name(b"..         "), "..");
    }

    #[test]
    fn short_name_layout() {
        assert_eq!(to_short_name("a.txt"), *b"A       TXT");
        assert_eq!(to_short_name("foo"), *b"FOO        ");
        assert_eq!(from_short_name(b"UNDEL   1  "), "undel.1");
    }

    #[test]
    fn cluster_halves_recombine() {
        assert_eq!(form_cluster(0x0001, 0x2345), 0x0001_2345);
        assert_eq!(form_cluster(0, 2), 2);
    }

    #[test]
    fn datetime_packs_msdos_layout() {
        let dt = Local.with_ymd_and_hms(2024, 1, 15, 14, 30, 52).unwrap();
        let (date, time) = pack_datetime(&dt);
        assert_eq!(date >> 9, 44); // 2024 - 1980
        assert_eq!((date >> 5) & 0x0F, 1);
        assert_eq!(date & 0x1F, 15);
        assert_eq!(time >> 11, 14);
        assert_eq!((time >> 5) & 0x3F, 30);
        assert_eq!(time & 0x1F, 26);
    }
}
