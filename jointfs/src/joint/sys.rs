//! Joint over the host operating system's filesystem.

use std::fs;
use std::io::{Read, Seek, SeekFrom};

use crate::error::{JointError, Result};
use crate::info::{FileInfo, FileKind};
use crate::joint::{take_page, Joint};
use crate::path::join_path;

/// Thin adapter over local open-for-read files. The key is a base
/// directory (possibly empty) that every opened path is joined onto.
pub struct SysJoint {
    dir: String,
    path: String,
    file: Option<fs::File>,
    listing: Option<Vec<FileInfo>>,
    rdn: usize,
}

impl SysJoint {
    pub fn new(dir: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            path: String::new(),
            file: None,
            listing: None,
            rdn: 0,
        }
    }

    fn file_mut(&mut self) -> Result<&mut fs::File> {
        self.file.as_mut().ok_or(JointError::NotOpen)
    }

    fn full_path(&self, fpath: &str) -> String {
        join_path(&self.dir, fpath)
    }
}

fn info_from_metadata(name: &str, md: &fs::Metadata) -> FileInfo {
    let kind = if md.is_dir() {
        FileKind::Dir
    } else if md.file_type().is_symlink() {
        FileKind::Symlink
    } else {
        FileKind::File
    };
    FileInfo::new(name, md.len(), md.modified().ok(), kind)
}

impl Joint for SysJoint {
    fn key(&self) -> &str {
        &self.dir
    }

    fn busy(&self) -> bool {
        self.file.is_some()
    }

    fn open(&mut self, fpath: &str) -> Result<()> {
        if self.busy() {
            return Err(JointError::AlreadyOpen);
        }
        self.file = Some(fs::File::open(self.full_path(fpath))?);
        self.path = fpath.to_string();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.file = None;
        self.listing = None;
        self.rdn = 0;
        self.path.clear();
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        if self.busy() {
            self.close()?;
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.file_mut()?.read(buf)?)
    }

    #[cfg(unix)]
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        use std::os::unix::fs::FileExt;
        Ok(self.file_mut()?.read_at(buf, offset)?)
    }

    #[cfg(not(unix))]
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let file = self.file_mut()?;
        let cur = file.stream_position()?;
        file.seek(SeekFrom::Start(offset))?;
        let n = file.read(buf)?;
        file.seek(SeekFrom::Start(cur))?;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        Ok(self.file_mut()?.seek(pos)?)
    }

    fn size(&mut self) -> Result<u64> {
        Ok(self.file_mut()?.metadata()?.len())
    }

    fn read_dir(&mut self, n: i64) -> Result<Vec<FileInfo>> {
        if self.listing.is_none() {
            if !self.busy() {
                return Err(JointError::NotOpen);
            }
            let full = self.full_path(&self.path);
            let mut list = Vec::new();
            for entry in fs::read_dir(full)? {
                let entry = entry?;
                let md = entry.metadata()?;
                let name = entry.file_name().to_string_lossy().into_owned();
                list.push(info_from_metadata(&name, &md));
            }
            list.sort_by(|a, b| a.name().cmp(b.name()));
            self.listing = Some(list);
        }
        let listing = self.listing.as_ref().unwrap();
        take_page(listing, &mut self.rdn, n)
    }

    fn stat(&mut self) -> Result<FileInfo> {
        let name = join_path(&self.dir, &self.path);
        let md = self.file_mut()?.metadata()?;
        Ok(info_from_metadata(&name, &md))
    }

    fn info(&mut self, fpath: &str) -> Result<FileInfo> {
        let full = self.full_path(fpath);
        let md = fs::metadata(&full)?;
        Ok(info_from_metadata(&full, &md))
    }
}

impl std::fmt::Debug for SysJoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysJoint")
            .field("dir", &self.dir)
            .field("path", &self.path)
            .field("busy", &self.busy())
            .finish()
    }
}
