//! Per-endpoint pooling of idle joints.
//!
//! Redialing a service or reparsing an image costs far more than opening
//! another inner file, so joints are pooled per endpoint key and reused.
//! A joint is either checked out to exactly one caller (wrapped in a
//! [`JointHandle`]) or idle inside its [`JointCache`]; idle joints expire
//! after [`crate::Config::disk_cache_expire`].
//!
//! Eviction runs on one background reaper thread per cache, which sleeps
//! until the earliest deadline and then pops the *head* of the idle queue.
//! Idle joints for one key are interchangeable, so evicting the oldest
//! joint instead of the exactly-expired one is fine, and it keeps the
//! idle and deadline vectors strictly index-aligned.

use std::io::{Read, Seek, SeekFrom};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::chain::make_joint;
use crate::config;
use crate::error::{join_errors, JointError, Result};
use crate::info::FileInfo;
use crate::joint::Joint;

/// Opaque identity of a joint, stable across checkout and checkin.
/// Used by the administrative cache surface (`has`, `eject`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointId(usize);

fn joint_id(j: &dyn Joint) -> JointId {
    JointId(j as *const dyn Joint as *const () as usize)
}

struct Idle {
    joints: Vec<Box<dyn Joint>>,
    deadlines: Vec<Instant>,
    reaping: bool,
}

/// Pool of idle joints for one endpoint key.
///
/// At every observation the idle vector and the deadline vector have the
/// same length, no joint appears twice, and no idle joint is busy.
pub struct JointCache {
    key: String,
    idle: Mutex<Idle>,
    wake: Condvar,
    this: Weak<JointCache>,
}

impl JointCache {
    /// Create an empty cache for one endpoint key.
    pub fn new(key: impl Into<String>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            key: key.into(),
            idle: Mutex::new(Idle {
                joints: Vec::new(),
                deadlines: Vec::new(),
                reaping: false,
            }),
            wake: Condvar::new(),
            this: this.clone(),
        })
    }

    /// The endpoint key this cache serves.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Number of idle joints currently pooled.
    pub fn count(&self) -> usize {
        self.idle.lock().joints.len()
    }

    /// Whether the joint with the given identity is pooled right now.
    pub fn has(&self, id: JointId) -> bool {
        self.idle
            .lock()
            .joints
            .iter()
            .any(|j| joint_id(j.as_ref()) == id)
    }

    /// Remove a specific joint from the pool and hand it back to the
    /// caller, who decides between reuse and cleanup.
    pub fn eject(&self, id: JointId) -> Option<Box<dyn Joint>> {
        let mut idle = self.idle.lock();
        let at = idle
            .joints
            .iter()
            .position(|j| joint_id(j.as_ref()) == id)?;
        idle.deadlines.remove(at);
        Some(idle.joints.remove(at))
    }

    /// Take the longest-idle joint out of the pool, if any.
    pub fn pop(self: &Arc<Self>) -> Option<JointHandle> {
        let mut idle = self.idle.lock();
        if idle.joints.is_empty() {
            return None;
        }
        idle.deadlines.remove(0);
        let joint = idle.joints.remove(0);
        Some(JointHandle::new(joint, Some(self.clone())))
    }

    /// Take an idle joint or build a fresh chain for the key.
    pub fn get(self: &Arc<Self>) -> Result<JointHandle> {
        if let Some(handle) = self.pop() {
            return Ok(handle);
        }
        let joint = make_joint(&self.key)?;
        Ok(JointHandle::new(joint, Some(self.clone())))
    }

    /// Return a joint to the pool and arm its expiration. A joint that
    /// is somehow still present is not inserted twice.
    pub fn put(&self, mut joint: Box<dyn Joint>) {
        if joint.busy() {
            // Idle joints must not hold an open file.
            if let Err(err) = joint.close() {
                warn!(key = %self.key, error = %err, "dropping joint that failed to close");
                let _ = joint.cleanup();
                return;
            }
        }
        let id = joint_id(joint.as_ref());
        let mut idle = self.idle.lock();
        if idle.joints.iter().any(|j| joint_id(j.as_ref()) == id) {
            return;
        }
        idle.joints.push(joint);
        idle.deadlines
            .push(Instant::now() + config::get().disk_cache_expire);
        if !idle.reaping {
            idle.reaping = true;
            self.spawn_reaper();
        } else {
            self.wake.notify_one();
        }
    }

    /// Cleanup every idle joint and stop the pending expirations. The
    /// cache stays usable afterwards.
    pub fn close(&self) -> Result<()> {
        let joints = {
            let mut idle = self.idle.lock();
            idle.deadlines.clear();
            self.wake.notify_one();
            std::mem::take(&mut idle.joints)
        };
        let mut errs = Vec::new();
        for mut joint in joints {
            if let Err(err) = joint.cleanup() {
                errs.push(err);
            }
        }
        join_errors(errs)
    }

    /// `fs`-style open: borrow a joint, open the inner path on it, and
    /// wrap it so `close` returns the joint here.
    ///
    /// A missing path leaves the joint healthy and pools it again; any
    /// other open failure tears the joint down, since the backend state
    /// is no longer trustworthy.
    pub fn open(self: &Arc<Self>, fpath: &str) -> Result<JointHandle> {
        let mut handle = self.get()?;
        match handle.open(fpath) {
            Ok(()) => Ok(handle),
            Err(err) if err.is_not_found() => {
                drop(handle); // returns the joint to the pool
                Err(err)
            }
            Err(err @ JointError::AlreadyOpen) => {
                // A freshly popped joint can never be busy; drop it
                // without disturbing the pool.
                handle.discard();
                Err(err)
            }
            Err(err) => {
                let _ = handle.cleanup();
                Err(err)
            }
        }
    }

    /// Metadata for a path, via a borrowed joint.
    pub fn stat(self: &Arc<Self>, fpath: &str) -> Result<FileInfo> {
        let mut handle = self.open(fpath)?;
        handle.stat()
    }

    /// Sorted directory listing for a path, via a borrowed joint.
    pub fn read_dir(self: &Arc<Self>, fpath: &str) -> Result<Vec<FileInfo>> {
        let mut handle = self.open(fpath)?;
        let mut list = handle.read_dir(-1)?;
        list.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(list)
    }

    fn spawn_reaper(&self) {
        let weak = self.this.clone();
        let key = self.key.clone();
        let spawned = thread::Builder::new()
            .name("jointfs-reaper".into())
            .spawn(move || reaper_loop(weak, key));
        if let Err(err) = spawned {
            warn!(error = %err, "failed to spawn cache reaper");
            self.idle.lock().reaping = false;
        }
    }
}

/// Eviction loop: wait for the earliest deadline, evict the head entry,
/// exit when the cache empties or goes away.
fn reaper_loop(weak: Weak<JointCache>, key: String) {
    loop {
        let Some(cache) = weak.upgrade() else { return };
        let mut idle = cache.idle.lock();
        if idle.deadlines.is_empty() {
            idle.reaping = false;
            return;
        }
        let next = idle.deadlines[0];
        let now = Instant::now();
        if next <= now {
            idle.deadlines.remove(0);
            let mut joint = idle.joints.remove(0);
            drop(idle);
            debug!(key = %key, "evicting expired idle joint");
            if let Err(err) = joint.cleanup() {
                debug!(key = %key, error = %err, "eviction cleanup failed");
            }
            continue;
        }
        let timeout = next - now;
        cache.wake.wait_for(&mut idle, timeout);
        // Re-check everything after the wait; `close` may have drained
        // the pool, or new entries may have arrived.
    }
}

/// Owning guard around a checked-out joint.
///
/// Dropping the handle (or calling [`JointHandle::close`]) closes the
/// inner file and returns the joint to its cache; [`JointHandle::cleanup`]
/// destroys it instead. The handle forwards the whole joint contract and
/// implements [`Read`]/[`Seek`] for plain `std::io` consumers.
pub struct JointHandle {
    joint: Option<Box<dyn Joint>>,
    cache: Option<Arc<JointCache>>,
}

impl std::fmt::Debug for JointHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JointHandle").finish_non_exhaustive()
    }
}

impl JointHandle {
    pub(crate) fn new(joint: Box<dyn Joint>, cache: Option<Arc<JointCache>>) -> Self {
        Self {
            joint: Some(joint),
            cache,
        }
    }

    fn joint_mut(&mut self) -> &mut dyn Joint {
        self.joint
            .as_deref_mut()
            .expect("joint present until the handle is consumed")
    }

    fn joint_ref(&self) -> &dyn Joint {
        self.joint
            .as_deref()
            .expect("joint present until the handle is consumed")
    }

    /// Identity token for `JointCache::has`/`eject`.
    pub fn id(&self) -> JointId {
        joint_id(self.joint_ref())
    }

    /// The cache this handle returns its joint to, if any.
    pub fn cache(&self) -> Option<&Arc<JointCache>> {
        self.cache.as_ref()
    }

    pub fn key(&self) -> &str {
        self.joint_ref().key()
    }

    pub fn busy(&self) -> bool {
        self.joint_ref().busy()
    }

    pub fn open(&mut self, fpath: &str) -> Result<()> {
        self.joint_mut().open(fpath)
    }

    /// Close only the inner file; the joint stays checked out.
    pub fn close_file(&mut self) -> Result<()> {
        self.joint_mut().close()
    }

    pub fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        self.joint_mut().read_at(buf, offset)
    }

    pub fn size(&mut self) -> Result<u64> {
        self.joint_mut().size()
    }

    pub fn read_dir(&mut self, n: i64) -> Result<Vec<FileInfo>> {
        self.joint_mut().read_dir(n)
    }

    pub fn stat(&mut self) -> Result<FileInfo> {
        self.joint_mut().stat()
    }

    pub fn info(&mut self, fpath: &str) -> Result<FileInfo> {
        self.joint_mut().info(fpath)
    }

    /// Close the inner file and return the joint to its cache.
    pub fn close(mut self) -> Result<()> {
        let mut joint = self.joint.take().expect("closing a consumed handle");
        let result = joint.close();
        match self.cache.take() {
            Some(cache) => cache.put(joint),
            None => {
                let _ = joint.cleanup();
            }
        }
        result
    }

    /// Tear the joint down instead of pooling it.
    pub fn cleanup(mut self) -> Result<()> {
        let mut joint = self.joint.take().expect("cleaning up a consumed handle");
        self.cache = None;
        joint.cleanup()
    }

    /// Drop the joint silently, bypassing both pool and cleanup.
    fn discard(mut self) {
        self.joint = None;
        self.cache = None;
    }
}

impl Drop for JointHandle {
    fn drop(&mut self) {
        if let Some(mut joint) = self.joint.take() {
            let _ = joint.close();
            if let Some(cache) = self.cache.take() {
                cache.put(joint);
            } else {
                let _ = joint.cleanup();
            }
        }
    }
}

impl Read for JointHandle {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.joint_mut().read(buf).map_err(into_io)
    }
}

impl Seek for JointHandle {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.joint_mut().seek(pos).map_err(into_io)
    }
}

fn into_io(err: JointError) -> std::io::Error {
    match err {
        JointError::Io(io) => io,
        other => std::io::Error::other(other),
    }
}
