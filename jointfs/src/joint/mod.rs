//! The joint contract and its backend implementations.
//!
//! A joint bundles one live connection (or one opened disk image) with at
//! most one currently opened inner file cursor. All five backends satisfy
//! the same [`Joint`] trait, which lets an ISO joint stack on top of any
//! other joint as its byte source, including another ISO joint.
//!
//! Joints are not thread-safe by design; the caches hand each joint to
//! exactly one caller at a time.

mod dav;
mod ftp;
mod iso;
mod sftp;
mod sys;

pub use dav::DavJoint;
pub use ftp::{ftp_escape_brackets, FtpJoint};
pub use iso::IsoJoint;
pub use sftp::SftpJoint;
pub use sys::SysJoint;

pub(crate) use dav::find_dav_root;

use std::io::SeekFrom;

use crate::error::{JointError, Result};
use crate::info::FileInfo;

/// One live backend connection plus at most one open inner file.
///
/// Invariants kept by every implementation:
///
/// - at most one inner file is open; `open` on a busy joint fails with
///   [`JointError::AlreadyOpen`];
/// - `busy` is true exactly while an inner path is open;
/// - `close` resets the cursor, the cached end offset, any in-flight
///   stream and any buffered directory listing, but keeps the connection;
/// - `cleanup` closes the inner file first, then tears down the
///   connection or image, aggregating every sub-error; it is idempotent
///   after the first success.
pub trait Joint: Send {
    /// The endpoint key this joint was constructed with (service address
    /// or image path).
    fn key(&self) -> &str;

    /// True while an inner file is open.
    fn busy(&self) -> bool;

    /// Open one inner file or directory by slash-separated path.
    fn open(&mut self, fpath: &str) -> Result<()>;

    /// Release the inner file; the connection stays up.
    fn close(&mut self) -> Result<()>;

    /// Close the inner file if any, then tear down the connection.
    fn cleanup(&mut self) -> Result<()>;

    /// Read from the current cursor of the open inner file.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Read at an absolute offset. The cursor may move; streaming
    /// backends restart their transfer when the offset jumps.
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Reposition the cursor. Resolving `SeekFrom::End` may contact the
    /// backend once to learn the file size.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Size of the currently open file, cached after first resolution.
    fn size(&mut self) -> Result<u64>;

    /// Return up to `n` entries of the open directory (`n < 0` means all
    /// remaining). Once a bounded request finds nothing left it fails
    /// with [`JointError::EndOfList`].
    fn read_dir(&mut self, n: i64) -> Result<Vec<FileInfo>>;

    /// Metadata of the currently open inner file.
    fn stat(&mut self) -> Result<FileInfo>;

    /// Metadata of an arbitrary sibling path, without opening it.
    fn info(&mut self, fpath: &str) -> Result<FileInfo>;
}

/// Shared pagination over a buffered directory listing.
///
/// `rdn` is the read cursor into `listing`; it advances by the number of
/// entries handed out. Unbounded requests drain the rest and never fail;
/// a bounded request against an exhausted listing reports `EndOfList`.
pub(crate) fn take_page(listing: &[FileInfo], rdn: &mut usize, n: i64) -> Result<Vec<FileInfo>> {
    if n < 0 {
        let page = listing[*rdn..].to_vec();
        *rdn = listing.len();
        return Ok(page);
    }
    if n == 0 {
        // A zero-count request is answered empty even at the end of the
        // listing; only a positive request can report the end sentinel.
        return Ok(Vec::new());
    }
    let remaining = listing.len() - *rdn;
    if remaining == 0 {
        return Err(JointError::EndOfList);
    }
    let take = (n as usize).min(remaining);
    let page = listing[*rdn..*rdn + take].to_vec();
    *rdn += take;
    Ok(page)
}

/// Fill `buf` completely from absolute `offset`, or fail with
/// `UnexpectedEof` if the underlying joint runs short.
pub(crate) fn read_exact_at(j: &mut dyn Joint, buf: &mut [u8], offset: u64) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = j.read_at(&mut buf[filled..], offset + filled as u64)?;
        if n == 0 {
            return Err(JointError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "short read from base joint",
            )));
        }
        filled += n;
    }
    Ok(())
}

/// Resolve a `SeekFrom` into an absolute offset given the current cursor
/// and a callback that resolves the end offset on demand.
pub(crate) fn resolve_seek(
    pos: SeekFrom,
    cur: u64,
    end: impl FnOnce() -> Result<u64>,
) -> Result<u64> {
    let abs = match pos {
        SeekFrom::Start(offset) => offset as i64,
        SeekFrom::Current(delta) => cur as i64 + delta,
        SeekFrom::End(delta) => end()? as i64 + delta,
    };
    if abs < 0 {
        return Err(JointError::NegativeSeek);
    }
    Ok(abs as u64)
}
