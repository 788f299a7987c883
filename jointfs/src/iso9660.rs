//! Minimal read-only ISO-9660 parser.
//!
//! Only the parts needed to walk a plain ISO-9660 hierarchy are
//! implemented: the Primary Volume Descriptor, directory records and
//! directory extent enumeration. Joliet, Rock Ridge, multi-extent files
//! and El Torito boot data are ignored. Entry identifiers are decoded
//! with the Windows-1251 code page, which is how the supported images
//! store non-ASCII names.
//!
//! All byte access goes through a base [`Joint`], so an image can live on
//! a local disk, behind a remote service, or inside another image.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use encoding_rs::WINDOWS_1251;

use crate::error::{JointError, Result};
use crate::joint::{read_exact_at, Joint};

/// ISO-9660 logical sector size.
pub const SECTOR_SIZE: u64 = 2048;

/// Volume descriptors start at sector 16.
const DESCRIPTOR_START: u64 = 16;

const TYPE_PRIMARY: u8 = 1;
const TYPE_TERMINATOR: u8 = 255;

/// Offset of the root directory record inside the PVD.
const PVD_ROOT_RECORD: usize = 156;

/// Directory records are at least 33 fixed bytes plus a one-byte
/// identifier.
const MIN_RECORD_LEN: usize = 34;

const FLAG_DIRECTORY: u8 = 0x02;

/// One parsed directory record.
#[derive(Debug, Clone)]
pub struct IsoRecord {
    /// Decoded identifier with any `;1` version suffix stripped. Empty
    /// for the self/parent pseudo-entries.
    pub name: String,
    /// First logical block of the data extent.
    pub extent: u32,
    /// Extent length in bytes.
    pub size: u32,
    flags: u8,
    /// Recording timestamp, when plausible.
    pub modified: Option<SystemTime>,
    special: bool,
}

impl IsoRecord {
    pub fn is_dir(&self) -> bool {
        self.flags & FLAG_DIRECTORY != 0
    }

    /// Absolute byte offset of the data extent within the image.
    pub fn data_offset(&self) -> u64 {
        u64::from(self.extent) * SECTOR_SIZE
    }
}

/// Parsed volume structure: just the root directory record.
#[derive(Debug, Clone)]
pub struct IsoVolume {
    pub root: IsoRecord,
}

/// Locate the Primary Volume Descriptor and extract the root directory
/// record. `base` must have the image open as its current inner file.
pub fn read_volume(base: &mut dyn Joint) -> Result<IsoVolume> {
    let mut sector = [0u8; SECTOR_SIZE as usize];
    for idx in 0.. {
        let offset = (DESCRIPTOR_START + idx) * SECTOR_SIZE;
        read_exact_at(base, &mut sector, offset)
            .map_err(|_| JointError::BadImage("volume descriptor set truncated".into()))?;
        if &sector[1..6] != b"CD001" {
            return Err(JointError::BadImage("missing CD001 signature".into()));
        }
        match sector[0] {
            TYPE_PRIMARY => {
                let (record, _) = parse_record(&sector[PVD_ROOT_RECORD..])?
                    .ok_or_else(|| JointError::BadImage("empty root record".into()))?;
                if !record.is_dir() {
                    return Err(JointError::BadImage("root record is not a directory".into()));
                }
                return Ok(IsoVolume { root: record });
            }
            TYPE_TERMINATOR => break,
            _ => continue,
        }
    }
    Err(JointError::BadImage("no primary volume descriptor".into()))
}

/// Enumerate the children of a directory record, excluding the self and
/// parent pseudo-entries. Records never cross sector boundaries; a zero
/// length byte skips to the next sector.
pub fn read_children(base: &mut dyn Joint, dir: &IsoRecord) -> Result<Vec<IsoRecord>> {
    if !dir.is_dir() {
        return Err(JointError::NotDirectory);
    }
    let mut data = vec![0u8; dir.size as usize];
    read_exact_at(base, &mut data, dir.data_offset())
        .map_err(|_| JointError::BadImage("directory extent truncated".into()))?;

    let mut children = Vec::new();
    let mut pos = 0usize;
    while pos < data.len() {
        if data[pos] == 0 {
            // End of records in this sector.
            pos = (pos / SECTOR_SIZE as usize + 1) * SECTOR_SIZE as usize;
            continue;
        }
        let (record, len) = match parse_record(&data[pos..])? {
            Some(parsed) => parsed,
            None => break,
        };
        pos += len;
        if !record.special {
            children.push(record);
        }
    }
    Ok(children)
}

/// Parse one directory record from the start of `buf`. Returns the record
/// and its on-disk length, or `None` for a zero length byte.
fn parse_record(buf: &[u8]) -> Result<Option<(IsoRecord, usize)>> {
    if buf.is_empty() || buf[0] == 0 {
        return Ok(None);
    }
    let len = buf[0] as usize;
    if len < MIN_RECORD_LEN || len > buf.len() {
        return Err(JointError::BadImage("malformed directory record".into()));
    }
    let id_len = buf[32] as usize;
    if 33 + id_len > len {
        return Err(JointError::BadImage("identifier overruns record".into()));
    }

    let extent = u32::from_le_bytes([buf[2], buf[3], buf[4], buf[5]]);
    let size = u32::from_le_bytes([buf[10], buf[11], buf[12], buf[13]]);
    let flags = buf[25];
    let modified = decode_timestamp(&buf[18..25]);

    let ident = &buf[33..33 + id_len];
    let (name, special) = decode_identifier(ident);

    Ok(Some((
        IsoRecord {
            name,
            extent,
            size,
            flags,
            modified,
            special,
        },
        len,
    )))
}

/// Decode an identifier via Windows-1251 and strip the `;1` version
/// suffix. The one-byte 0x00/0x01 identifiers are the directory's own
/// and parent entries.
fn decode_identifier(ident: &[u8]) -> (String, bool) {
    if ident == [0x00] || ident == [0x01] {
        return (String::new(), true);
    }
    let mut ident = ident;
    if let Some(sep) = ident.iter().position(|&b| b == b';') {
        ident = &ident[..sep];
    }
    let (decoded, _, _) = WINDOWS_1251.decode(ident);
    (decoded.into_owned(), false)
}

/// The 7-byte recording timestamp: offset from 1900, month, day, hour,
/// minute, second, timezone in 15-minute steps from -48 to +52.
fn decode_timestamp(b: &[u8]) -> Option<SystemTime> {
    use chrono::{FixedOffset, NaiveDate, TimeZone};

    let (year, month, day) = (1900 + b[0] as i32, b[1] as u32, b[2] as u32);
    if month == 0 || day == 0 {
        return None;
    }
    let tz_secs = (b[6] as i8) as i32 * 900;
    let offset = FixedOffset::east_opt(tz_secs)?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let naive = date.and_hms_opt(b[3] as u32, b[4] as u32, b[5] as u32)?;
    let ts = offset.from_local_datetime(&naive).single()?.timestamp();
    if ts < 0 {
        return None;
    }
    Some(UNIX_EPOCH + Duration::from_secs(ts as u64))
}
