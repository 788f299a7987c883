//! Process-scoped directory of joint caches.
//!
//! A [`JointPool`] maps endpoint keys to their [`JointCache`]s and offers
//! a filesystem-like surface over arbitrary composite paths: each call
//! splits the path into an endpoint key and a local remainder, borrows a
//! joint for the key and returns it afterwards. [`SubPool`] scopes the
//! same pool to a fixed root directory.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::cache::{JointCache, JointHandle};
use crate::error::{join_errors, JointError, Result};
use crate::info::FileInfo;
use crate::joint::{find_dav_root, Joint, SysJoint};
use crate::path::{has_fold_prefix, is_type_iso, is_valid_path, join_path, split_key};

/// Map of endpoint key to joint cache, shared between threads.
#[derive(Default)]
pub struct JointPool {
    caches: RwLock<HashMap<String, Arc<JointCache>>>,
}

impl JointPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// All endpoint keys with a cache, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.caches.read().keys().cloned().collect()
    }

    /// The cache for one endpoint key, created lazily on first use.
    pub fn get_cache(&self, key: &str) -> Arc<JointCache> {
        if let Some(cache) = self.caches.read().get(key) {
            return cache.clone();
        }
        let mut caches = self.caches.write();
        caches
            .entry(key.to_string())
            .or_insert_with(|| JointCache::new(key))
            .clone()
    }

    /// Borrow a joint for one endpoint key.
    pub fn get_joint(&self, key: &str) -> Result<JointHandle> {
        self.get_cache(key).get()
    }

    /// Close every cache, keeping the map entries for reuse.
    pub fn close(&self) -> Result<()> {
        let caches: Vec<Arc<JointCache>> = self.caches.read().values().cloned().collect();
        let errs: Vec<JointError> = caches
            .iter()
            .filter_map(|cache| cache.close().err())
            .collect();
        join_errors(errs)
    }

    /// Close every cache and forget them all.
    pub fn clear(&self) -> Result<()> {
        let result = self.close();
        self.caches.write().clear();
        result
    }

    /// Split a composite path into its cache key and local remainder,
    /// resolving the WebDAV root for bare `http(s)` keys.
    fn resolve_key(&self, fullpath: &str) -> Result<(String, String, bool)> {
        let (key, fpath, cached) = split_key(fullpath);
        if cached
            && !is_type_iso(key)
            && (has_fold_prefix(key, "http://") || has_fold_prefix(key, "https://"))
        {
            let root = find_dav_root(key, fpath)
                .ok_or_else(|| JointError::DavRootNotFound(key.to_string()))?;
            let rest = fpath[root.len() - 1..].to_string();
            return Ok((format!("{key}{root}"), rest, true));
        }
        Ok((key.to_string(), fpath.to_string(), cached))
    }

    /// Open a file anywhere a composite path can reach: local disks,
    /// remote services and nested ISO images. The returned handle puts
    /// its joint back into this pool when closed or dropped.
    ///
    /// Plain local paths bypass the pool; a fresh local joint costs
    /// nothing worth caching.
    pub fn open(&self, fullpath: &str) -> Result<JointHandle> {
        let (key, fpath, cached) = self.resolve_key(fullpath)?;
        if !cached {
            let mut joint: Box<dyn Joint> = Box::new(SysJoint::new(key));
            joint.open(&fpath)?;
            return Ok(JointHandle::new(joint, None));
        }
        self.get_cache(&key).open(&fpath)
    }

    /// Metadata of the file a composite path points at.
    pub fn stat(&self, fullpath: &str) -> Result<FileInfo> {
        let mut handle = self.open(fullpath)?;
        handle.stat()
    }

    /// Sorted listing of the directory a composite path points at.
    pub fn read_dir(&self, fullpath: &str) -> Result<Vec<FileInfo>> {
        let mut handle = self.open(fullpath)?;
        let mut list = handle.read_dir(-1)?;
        list.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(list)
    }

    /// Scope this pool to an absolute root directory, typically a remote
    /// service or an image. Fails if the directory cannot be reached, or
    /// if it is a *real* directory that merely carries an `.iso` name
    /// (stepping into those is ambiguous and refused).
    pub fn sub(self: &Arc<Self>, dir: &str) -> Result<SubPool> {
        let fi = self.stat(dir)?;
        if fi.is_real_dir() && is_type_iso(dir) {
            return Err(JointError::NotFound);
        }
        Ok(SubPool {
            pool: self.clone(),
            dir: dir.to_string(),
        })
    }
}

/// A [`JointPool`] view rooted at a fixed directory. All paths given to
/// it are relative and validated; the shared pool does the actual work.
pub struct SubPool {
    pool: Arc<JointPool>,
    dir: String,
}

impl SubPool {
    /// Root the given pool at `dir` without checking reachability.
    pub fn new(pool: Arc<JointPool>, dir: impl Into<String>) -> Self {
        Self {
            pool,
            dir: dir.into(),
        }
    }

    /// Root directory of this view.
    pub fn dir(&self) -> &str {
        &self.dir
    }

    fn check(&self, fpath: &str) -> Result<()> {
        if !self.dir.is_empty() && self.dir != "." && !is_valid_path(fpath) {
            return Err(JointError::InvalidPath);
        }
        Ok(())
    }

    pub fn open(&self, fpath: &str) -> Result<JointHandle> {
        self.check(fpath)?;
        self.pool.open(&join_path(&self.dir, fpath))
    }

    pub fn stat(&self, fpath: &str) -> Result<FileInfo> {
        self.check(fpath)?;
        self.pool.stat(&join_path(&self.dir, fpath))
    }

    pub fn read_dir(&self, fpath: &str) -> Result<Vec<FileInfo>> {
        self.check(fpath)?;
        self.pool.read_dir(&join_path(&self.dir, fpath))
    }

    /// Derive a view rooted deeper inside this one.
    pub fn sub(&self, dir: &str) -> Result<SubPool> {
        self.check(dir)?;
        self.pool.sub(&join_path(&self.dir, dir))
    }
}
