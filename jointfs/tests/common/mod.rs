//! Shared fixtures: an in-memory ISO-9660 image writer and the standard
//! two-level image tree used across the integration tests.
//!
//! The writer emits plain ISO-9660: PVD at sector 16, a set terminator,
//! one sector per directory extent and sector-aligned file extents.
//! Identifiers are stored in Windows-1251 with a `;1` version suffix on
//! files, matching how the supported real-world images are authored.

// Each test binary uses its own slice of this module.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use encoding_rs::WINDOWS_1251;
use tempfile::TempDir;

const SECTOR: usize = 2048;

#[derive(Default)]
struct DirNode {
    dirs: BTreeMap<String, DirNode>,
    files: Vec<(String, Vec<u8>)>,
}

/// Declarative ISO image builder. Intermediate directories are created
/// on demand.
#[derive(Default)]
pub struct IsoBuilder {
    root: DirNode,
}

impl IsoBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, path: &str, data: impl AsRef<[u8]>) -> Self {
        let (dir, name) = match path.rsplit_once('/') {
            Some((dir, name)) => (dir, name),
            None => ("", path),
        };
        self.node_mut(dir)
            .files
            .push((name.to_string(), data.as_ref().to_vec()));
        self
    }

    pub fn dir(mut self, path: &str) -> Self {
        self.node_mut(path);
        self
    }

    fn node_mut(&mut self, path: &str) -> &mut DirNode {
        let mut node = &mut self.root;
        if path.is_empty() {
            return node;
        }
        for chunk in path.split('/') {
            node = node.dirs.entry(chunk.to_string()).or_default();
        }
        node
    }

    pub fn build(self) -> Vec<u8> {
        // Flatten the tree so every directory knows its parent.
        struct Flat {
            parent: usize,
            subdirs: Vec<(String, usize)>,
            files: Vec<(String, Vec<u8>)>,
        }
        fn flatten(node: DirNode, parent: usize, out: &mut Vec<Flat>) -> usize {
            let idx = out.len();
            out.push(Flat {
                parent,
                subdirs: Vec::new(),
                files: node.files,
            });
            for (name, sub) in node.dirs {
                let sub_idx = flatten(sub, idx, out);
                out[idx].subdirs.push((name, sub_idx));
            }
            idx
        }
        let mut flat = Vec::new();
        flatten(self.root, 0, &mut flat);

        // Directory extents first (one sector each), then file extents.
        let dir_lba: Vec<u32> = (0..flat.len()).map(|i| 18 + i as u32).collect();
        let mut next = 18 + flat.len() as u32;
        let mut file_lba: Vec<Vec<u32>> = Vec::with_capacity(flat.len());
        for dir in &flat {
            let mut lbas = Vec::with_capacity(dir.files.len());
            for (_, data) in &dir.files {
                lbas.push(next);
                next += data.len().div_ceil(SECTOR) as u32;
            }
            file_lba.push(lbas);
        }
        let total = next as usize;
        let mut image = vec![0u8; total * SECTOR];

        write_pvd(&mut image, total as u32, dir_lba[0]);
        write_terminator(&mut image);

        for (idx, dir) in flat.iter().enumerate() {
            let mut sector = Vec::with_capacity(SECTOR);
            push_record(&mut sector, &[0x00], dir_lba[idx], SECTOR as u32, 0x02);
            push_record(
                &mut sector,
                &[0x01],
                dir_lba[dir.parent],
                SECTOR as u32,
                0x02,
            );
            for (name, sub_idx) in &dir.subdirs {
                push_record(
                    &mut sector,
                    &encode_name(name),
                    dir_lba[*sub_idx],
                    SECTOR as u32,
                    0x02,
                );
            }
            for (fidx, (name, data)) in dir.files.iter().enumerate() {
                let mut ident = encode_name(name);
                ident.extend_from_slice(b";1");
                push_record(
                    &mut sector,
                    &ident,
                    file_lba[idx][fidx],
                    data.len() as u32,
                    0x00,
                );
            }
            assert!(sector.len() <= SECTOR, "directory overflows one sector");
            let at = dir_lba[idx] as usize * SECTOR;
            image[at..at + sector.len()].copy_from_slice(&sector);

            for (fidx, (_, data)) in dir.files.iter().enumerate() {
                let at = file_lba[idx][fidx] as usize * SECTOR;
                image[at..at + data.len()].copy_from_slice(data);
            }
        }
        image
    }
}

fn encode_name(name: &str) -> Vec<u8> {
    WINDOWS_1251.encode(name).0.into_owned()
}

fn both_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
    buf[at + 4..at + 8].copy_from_slice(&value.to_be_bytes());
}

fn both_u16(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
    buf[at + 2..at + 4].copy_from_slice(&value.to_be_bytes());
}

fn push_record(sector: &mut Vec<u8>, ident: &[u8], extent: u32, size: u32, flags: u8) {
    let id_len = ident.len();
    let pad = usize::from(id_len % 2 == 0);
    let len = 33 + id_len + pad;
    let mut rec = vec![0u8; len];
    rec[0] = len as u8;
    both_u32(&mut rec, 2, extent);
    both_u32(&mut rec, 10, size);
    rec[18..25].copy_from_slice(&[124, 6, 15, 10, 20, 30, 0]);
    rec[25] = flags;
    both_u16(&mut rec, 28, 1);
    rec[32] = id_len as u8;
    rec[33..33 + id_len].copy_from_slice(ident);
    sector.extend_from_slice(&rec);
}

fn write_pvd(image: &mut [u8], total_sectors: u32, root_lba: u32) {
    let at = 16 * SECTOR;
    let pvd = &mut image[at..at + SECTOR];
    pvd[0] = 1;
    pvd[1..6].copy_from_slice(b"CD001");
    pvd[6] = 1;
    pvd[8..40].fill(b' ');
    let mut volume_id = [b' '; 32];
    volume_id[..9].copy_from_slice(b"JOINTTEST");
    pvd[40..72].copy_from_slice(&volume_id);
    both_u32(pvd, 80, total_sectors);
    both_u16(pvd, 120, 1);
    both_u16(pvd, 124, 1);
    both_u16(pvd, 128, SECTOR as u16);

    let mut root = Vec::with_capacity(34);
    push_record(&mut root, &[0x00], root_lba, SECTOR as u32, 0x02);
    pvd[156..156 + root.len()].copy_from_slice(&root);
}

fn write_terminator(image: &mut [u8]) {
    let at = 17 * SECTOR;
    image[at] = 255;
    image[at + 1..at + 6].copy_from_slice(b"CD001");
    image[at + 6] = 1;
}

// The standard fixture tree, mirroring a small media archive with one
// image nested inside the other.

pub const FOX: &str = "The quick brown fox jumps over the lazy dog.";
pub const DOC1: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit, \
sed do eiusmod tempor incididunt ut labore et dolore magna aliqua.";
pub const DOC2: &str = "Sed ut perspiciatis, unde omnis iste natus error sit voluptatem \
accusantium doloremque laudantium, totam rem aperiam, eaque ipsa quae ab illo inventore \
veritatis et quasi architecto beatae vitae dicta sunt explicabo.";
pub const LOREM1: &str = "Ut enim ad minim veniam, quis nostrud exercitation ullamco \
laboris nisi ut aliquip ex ea commodo consequat.";
pub const LOREM2: &str = "Duis aute irure dolor in reprehenderit in voluptate velit \
esse cillum dolore eu fugiat nulla pariatur.";
pub const LOREM3: &str = "Excepteur sint occaecat cupidatat non proident, sunt in \
culpa qui officia deserunt mollit anim id est laborum.";
pub const RYBA: &str = "Щука и карась живут в пресной воде.";
pub const DOK1: &str = "Первый документ с кириллическим именем.";
pub const DOK2: &str = "Второй документ с кириллическим именем.";

/// Files reachable inside `internal.iso`, with their contents.
pub fn internal_files() -> Vec<(&'static str, &'static str)> {
    vec![
        ("fox.txt", FOX),
        ("docs/doc1.txt", DOC1),
        ("docs/doc2.txt", DOC2),
        ("доки/док1.txt", DOK1),
        ("доки/док2.txt", DOK2),
    ]
}

/// Files reachable inside `external.iso` (the nested image excluded),
/// with their contents.
pub fn external_files() -> Vec<(&'static str, &'static str)> {
    vec![
        ("fox.txt", FOX),
        ("data/lorem1.txt", LOREM1),
        ("data/lorem2.txt", LOREM2),
        ("data/lorem3.txt", LOREM3),
        ("data/рыба.txt", RYBA),
        ("data/docs/doc1.txt", DOC1),
        ("data/docs/doc2.txt", DOC2),
        ("data/доки/док1.txt", DOK1),
        ("data/доки/док2.txt", DOK2),
    ]
}

pub fn build_internal_iso() -> Vec<u8> {
    let mut builder = IsoBuilder::new();
    for (path, data) in internal_files() {
        builder = builder.file(path, data);
    }
    builder.build()
}

pub fn build_external_iso() -> Vec<u8> {
    let mut builder = IsoBuilder::new();
    for (path, data) in external_files() {
        builder = builder.file(path, data);
    }
    builder
        .dir("data/empty")
        .file("disk/internal.iso", build_internal_iso())
        .build()
}

/// Temp workspace with `testdata/external.iso` written to disk.
pub struct Fixture {
    #[allow(dead_code)]
    tmp: TempDir,
    pub external: PathBuf,
}

impl Fixture {
    /// Path of the external image as a composite-path prefix.
    pub fn external_path(&self) -> String {
        self.external.to_string_lossy().into_owned()
    }

    /// Composite path of the nested image.
    pub fn internal_path(&self) -> String {
        format!("{}/disk/internal.iso", self.external_path())
    }
}

pub fn setup() -> Fixture {
    let tmp = TempDir::new().expect("create temp dir");
    let testdata = tmp.path().join("testdata");
    fs::create_dir_all(&testdata).expect("create testdata dir");
    let external = testdata.join("external.iso");
    fs::write(&external, build_external_iso()).expect("write external.iso");
    Fixture { tmp, external }
}
