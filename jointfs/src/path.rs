//! Pure string helpers for composite paths.
//!
//! A composite path may start with a service URL (`ftp://`, `sftp://`,
//! `http://`, `https://`) or a local filesystem path, and may step through
//! any number of nested `.iso` images. The helpers here classify and split
//! such paths without touching any backend.

/// Case-insensitive prefix test, ASCII only.
pub fn has_fold_prefix(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len() && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Fast join of two path chunks with exactly one `/` between them.
/// Empty or `.` chunks yield the other chunk unchanged; no other
/// normalization is performed.
pub fn join_path(dir: &str, base: &str) -> String {
    if dir.is_empty() || dir == "." {
        return base.to_string();
    }
    if base.is_empty() || base == "." {
        return dir.to_string();
    }
    match (dir.ends_with('/'), base.starts_with('/')) {
        (true, true) => format!("{}{}", dir, &base[1..]),
        (false, false) => format!("{}/{}", dir, base),
        _ => format!("{}{}", dir, base),
    }
}

/// Whether the endpoint file of the given path has an ISO extension.
pub fn is_type_iso(fpath: &str) -> bool {
    let b = fpath.as_bytes();
    b.len() >= 4 && (b.ends_with(b".iso") || b.ends_with(b".ISO"))
}

/// Split a URL into the address (scheme, credentials and authority) and
/// the path that follows, as-is. A plain filesystem path is split into
/// its volume name (empty on non-Windows hosts) and the remainder.
/// The third value reports whether the input was a URL.
pub fn split_url(urlpath: &str) -> (&str, &str, bool) {
    if let Some(i) = urlpath.find("://") {
        return match urlpath[i + 3..].find('/') {
            Some(j) => (&urlpath[..i + 3 + j], &urlpath[i + 3 + j + 1..], true),
            None => (urlpath, "", true),
        };
    }
    let vol = volume_name(urlpath);
    if !vol.is_empty() {
        if urlpath.len() > vol.len() + 1 {
            return (vol, &urlpath[vol.len() + 1..], false);
        }
        return (vol, "", false);
    }
    ("", urlpath, false)
}

#[cfg(windows)]
fn volume_name(fpath: &str) -> &str {
    let b = fpath.as_bytes();
    if b.len() >= 2 && b[1] == b':' && b[0].is_ascii_alphabetic() {
        &fpath[..2]
    } else {
        ""
    }
}

#[cfg(not(windows))]
fn volume_name(_fpath: &str) -> &str {
    ""
}

/// Split a full composite path into the joint key (the outermost resource
/// whose handle is worth caching) and the remaining local path. The third
/// value reports whether the key refers to something other than the
/// primary filesystem.
///
/// For `http(s)` URLs without an ISO boundary the returned key is the bare
/// address; the WebDAV root inside it is discovered separately.
pub fn split_key(fullpath: &str) -> (&str, &str, bool) {
    if is_type_iso(fullpath) {
        return (fullpath, "", true);
    }
    let p = match (fullpath.rfind(".iso/"), fullpath.rfind(".ISO/")) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };
    if let Some(p) = p {
        return (&fullpath[..p + 4], &fullpath[p + 5..], true);
    }
    split_url(fullpath)
}

/// Whether `fpath` is a canonical slash-separated relative path: no empty,
/// `.` or `..` elements and no leading or trailing separator. The single
/// path `.` names the root and is valid.
pub fn is_valid_path(fpath: &str) -> bool {
    if fpath == "." {
        return true;
    }
    if fpath.is_empty() {
        return false;
    }
    fpath
        .split('/')
        .all(|seg| !seg.is_empty() && seg != "." && seg != "..")
}
