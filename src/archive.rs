//! Archive collaborator surface
//!
//! Thin wrapper over the zip container format: entry listing, byte
//! extraction, and output construction. Everything above this module works
//! with logical entries and never touches the container directly.

use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::MergeError;

/// Extensions treated as pack archives, both for input scanning and for
/// nested-pack detection inside a source
pub const PACK_EXTENSIONS: &[&str] = &["rpf", "zip"];

pub fn is_archive_name(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((_, ext)) => PACK_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)),
        None => false,
    }
}

/// A single listing entry as reported by the container
#[derive(Debug, Clone)]
pub struct RawEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

/// Read handle for a pack, either on disk or extracted into memory
/// (nested packs are opened from a scratch buffer)
pub enum PackReader {
    File(ZipArchive<File>),
    Memory(ZipArchive<Cursor<Vec<u8>>>),
}

impl PackReader {
    pub fn open(path: &Path) -> Result<Self, MergeError> {
        let file = File::open(path).map_err(|e| MergeError::SourceLoad {
            path: path.display().to_string(),
            reason: format!("failed to open: {}", e),
        })?;
        let archive = ZipArchive::new(file).map_err(|e| MergeError::SourceLoad {
            path: path.display().to_string(),
            reason: format!("not a readable pack: {}", e),
        })?;
        Ok(PackReader::File(archive))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, MergeError> {
        let archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| MergeError::SourceLoad {
            path: "<nested pack>".to_string(),
            reason: format!("not a readable pack: {}", e),
        })?;
        Ok(PackReader::Memory(archive))
    }

    /// List the container's immediate entries
    pub fn raw_entries(&mut self) -> Vec<RawEntry> {
        match self {
            PackReader::File(archive) => list_entries(archive),
            PackReader::Memory(archive) => list_entries(archive),
        }
    }

    /// Extract one entry's bytes by its container name
    pub fn read(&mut self, name: &str) -> std::io::Result<Vec<u8>> {
        match self {
            PackReader::File(archive) => read_entry(archive, name),
            PackReader::Memory(archive) => read_entry(archive, name),
        }
    }
}

fn list_entries<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Vec<RawEntry> {
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        if let Ok(file) = archive.by_index(index) {
            entries.push(RawEntry {
                name: file.name().to_string(),
                is_dir: file.is_dir(),
                size: file.size(),
            });
        }
    }
    entries
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> std::io::Result<Vec<u8>> {
    let mut file = archive
        .by_name(name)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::NotFound, e))?;
    let mut bytes = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Write handle used to construct the output pack and the re-packed
/// nested containers
pub struct PackWriter<W: Write + Seek> {
    inner: ZipWriter<W>,
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

impl PackWriter<File> {
    pub fn create(path: &Path) -> Result<Self, MergeError> {
        let file = File::create(path).map_err(|e| MergeError::OutputWrite {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(PackWriter {
            inner: ZipWriter::new(file),
        })
    }
}

impl PackWriter<Cursor<Vec<u8>>> {
    pub fn memory() -> Self {
        PackWriter {
            inner: ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    pub fn into_bytes(self) -> Result<Vec<u8>, MergeError> {
        self.inner
            .finish()
            .map(Cursor::into_inner)
            .map_err(|e| MergeError::OutputWrite {
                path: "<nested pack>".to_string(),
                reason: e.to_string(),
            })
    }
}

impl<W: Write + Seek> PackWriter<W> {
    pub fn add_directory(&mut self, name: &str) -> Result<(), MergeError> {
        self.inner
            .add_directory(name, entry_options())
            .map_err(|e| MergeError::OutputWrite {
                path: name.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn add_file(&mut self, name: &str, bytes: &[u8]) -> Result<(), MergeError> {
        self.inner
            .start_file(name, entry_options())
            .map_err(|e| MergeError::OutputWrite {
                path: name.to_string(),
                reason: e.to_string(),
            })?;
        self.inner
            .write_all(bytes)
            .map_err(|e| MergeError::OutputWrite {
                path: name.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn finish(self) -> Result<(), MergeError> {
        self.inner.finish().map(|_| ()).map_err(|e| MergeError::OutputWrite {
            path: "<output pack>".to_string(),
            reason: e.to_string(),
        })
    }
}

/// Recursively scan a directory for pack archives, sorted for a stable
/// source order
pub fn find_pack_files(dir: &Path) -> Result<Vec<PathBuf>, MergeError> {
    let mut found = Vec::new();
    scan_dir(dir, &mut found)?;
    found.sort();
    Ok(found)
}

fn scan_dir(dir: &Path, found: &mut Vec<PathBuf>) -> Result<(), MergeError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            scan_dir(&path, found)?;
        } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if is_archive_name(name) {
                found.push(path);
            }
        }
    }
    Ok(())
}
