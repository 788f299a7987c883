//! Joint over an ISO-9660 image carried by another joint.

use std::collections::HashMap;
use std::io::SeekFrom;

use crate::error::{JointError, Result};
use crate::info::{FileInfo, FileKind};
use crate::iso9660::{self, IsoRecord};
use crate::joint::{resolve_seek, take_page, Joint};
use crate::path::{is_valid_path, join_path};

/// Byte window of the currently open inner file within the base joint.
struct Section {
    offset: u64,
    len: u64,
    pos: u64,
}

/// Opens an ISO-9660 image on top of a base joint and resolves
/// slash-separated paths against its directory tree.
///
/// The base may be any joint, including another `IsoJoint`, which is how
/// nested images are traversed. Every directory record resolved during a
/// walk is memoized under its canonical path, so repeated lookups under
/// the same image skip the sector reads.
pub struct IsoJoint {
    key: String,
    base: Box<dyn Joint>,
    records: HashMap<String, IsoRecord>,
    current: Option<IsoRecord>,
    section: Option<Section>,
    listing: Option<Vec<FileInfo>>,
    rdn: usize,
}

impl IsoJoint {
    /// Open `isopath` on `base` and parse the image structure. The root
    /// directory record is primed into the lookup cache under the empty
    /// path.
    pub fn open_image(mut base: Box<dyn Joint>, isopath: &str) -> Result<Self> {
        base.open(isopath)?;
        let volume = iso9660::read_volume(base.as_mut())?;
        let mut records = HashMap::new();
        records.insert(String::new(), volume.root);
        Ok(Self {
            key: isopath.to_string(),
            base,
            records,
            current: None,
            section: None,
            listing: None,
            rdn: 0,
        })
    }

    /// The joint this image is layered on.
    pub fn base(&self) -> &dyn Joint {
        self.base.as_ref()
    }

    /// Resolve a path to its directory record, walking and memoizing
    /// intermediate directories as needed.
    fn lookup(&mut self, fpath: &str) -> Result<IsoRecord> {
        if let Some(rec) = self.records.get(fpath) {
            return Ok(rec.clone());
        }
        if !is_valid_path(fpath) {
            return Err(JointError::InvalidPath);
        }

        let mut curdir = String::new();
        let mut file = self.records[""].clone();
        for chunk in fpath.split('/') {
            if !file.is_dir() {
                return Err(JointError::NotFound);
            }
            let curpath = join_path(&curdir, chunk);
            if let Some(rec) = self.records.get(&curpath) {
                file = rec.clone();
            } else {
                let children = iso9660::read_children(self.base.as_mut(), &file)?;
                let mut found = false;
                for child in children {
                    let child_path = join_path(&curdir, &child.name);
                    let hit = child.name == chunk;
                    if hit {
                        file = child.clone();
                        found = true;
                    }
                    self.records.insert(child_path, child);
                    if found {
                        break;
                    }
                }
                if !found {
                    return Err(JointError::NotFound);
                }
            }
            curdir = curpath;
        }
        Ok(file)
    }

    fn section_mut(&mut self) -> Result<&mut Section> {
        self.section.as_mut().ok_or(JointError::NotOpen)
    }

    /// True when the open inner path is the image itself.
    fn whole_image_open(&self) -> bool {
        matches!((&self.current, &self.section), (Some(rec), Some(_)) if rec.is_dir())
    }
}

fn info_from_record(rec: &IsoRecord) -> FileInfo {
    let kind = if rec.is_dir() {
        FileKind::Dir
    } else {
        FileKind::File
    };
    FileInfo::new(rec.name.clone(), u64::from(rec.size), rec.modified, kind)
}

impl Joint for IsoJoint {
    fn key(&self) -> &str {
        &self.key
    }

    fn busy(&self) -> bool {
        self.current.is_some()
    }

    fn open(&mut self, fpath: &str) -> Result<()> {
        if self.busy() {
            return Err(JointError::AlreadyOpen);
        }
        // The dot folder is an alias of the image root.
        let fpath = if fpath == "." { "" } else { fpath };
        let rec = self.lookup(fpath)?;
        if fpath.is_empty() {
            // The image itself: expose the base joint's full byte range,
            // which is what a nested image parser reads from.
            let len = self.base.size()?;
            self.section = Some(Section {
                offset: 0,
                len,
                pos: 0,
            });
        } else if !rec.is_dir() {
            self.section = Some(Section {
                offset: rec.data_offset(),
                len: u64::from(rec.size),
                pos: 0,
            });
        } else {
            self.section = None;
        }
        self.current = Some(rec);
        self.listing = None;
        self.rdn = 0;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.current = None;
        self.section = None;
        self.listing = None;
        self.rdn = 0;
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        if self.busy() {
            self.close()?;
        }
        self.base.cleanup()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let (offset, len, pos) = {
            let sec = self.section_mut()?;
            (sec.offset, sec.len, sec.pos)
        };
        if pos >= len {
            return Ok(0);
        }
        let avail = (len - pos).min(buf.len() as u64) as usize;
        let n = self.base.read_at(&mut buf[..avail], offset + pos)?;
        self.section_mut()?.pos += n as u64;
        Ok(n)
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let sec = self.section_mut()?;
        sec.pos = offset;
        self.read(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let (cur, len) = {
            let sec = self.section_mut()?;
            (sec.pos, sec.len)
        };
        let abs = resolve_seek(pos, cur, || Ok(len))?;
        self.section_mut()?.pos = abs;
        Ok(abs)
    }

    fn size(&mut self) -> Result<u64> {
        if let Some(sec) = &self.section {
            return Ok(sec.len);
        }
        let rec = self.current.as_ref().ok_or(JointError::NotOpen)?;
        Ok(u64::from(rec.size))
    }

    fn read_dir(&mut self, n: i64) -> Result<Vec<FileInfo>> {
        if self.listing.is_none() {
            let rec = self.current.clone().ok_or(JointError::NotOpen)?;
            let children = iso9660::read_children(self.base.as_mut(), &rec)?;
            self.listing = Some(children.iter().map(info_from_record).collect());
        }
        let listing = self.listing.as_ref().unwrap();
        take_page(listing, &mut self.rdn, n)
    }

    fn stat(&mut self) -> Result<FileInfo> {
        if self.whole_image_open() {
            // The open inner path is the image itself; report the image
            // file as seen by the base joint.
            return self.base.stat();
        }
        let rec = self.current.as_ref().ok_or(JointError::NotOpen)?;
        Ok(info_from_record(rec))
    }

    fn info(&mut self, fpath: &str) -> Result<FileInfo> {
        let fpath = if fpath == "." { "" } else { fpath };
        let rec = self.lookup(fpath)?;
        Ok(info_from_record(&rec))
    }
}

impl std::fmt::Debug for IsoJoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsoJoint")
            .field("key", &self.key)
            .field("busy", &self.busy())
            .field("cached_records", &self.records.len())
            .finish()
    }
}
