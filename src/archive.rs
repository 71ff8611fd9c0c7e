//! ZIP archive access.
//!
//! Archives are mapped read-only and parsed lazily: entry names are listed
//! up front, entry content is read on demand. Every open failure collapses
//! into [`JardexError::ArchiveUnreadable`] so the indexer can skip the
//! artifact and move on.

use memmap2::Mmap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

use crate::error::JardexError;

pub struct Archive {
    path: PathBuf,
    zip: ZipArchive<Cursor<Mmap>>,
}

impl Archive {
    pub fn open(path: &Path) -> Result<Self, JardexError> {
        let unreadable = |reason: String| JardexError::ArchiveUnreadable {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path).map_err(|e| unreadable(e.to_string()))?;
        // SAFETY: The file is opened read-only and the map lives inside the
        // returned Archive, which never outlives the mapping.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| unreadable(e.to_string()))?;
        let zip = ZipArchive::new(Cursor::new(mmap)).map_err(|e| unreadable(e.to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            zip,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.zip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zip.len() == 0
    }

    /// Entry names in archive order. Directories are excluded.
    pub fn entry_names(&mut self) -> Result<Vec<String>, JardexError> {
        let mut names = Vec::with_capacity(self.zip.len());
        let path = self.path.clone();
        for i in 0..self.zip.len() {
            let entry = self.zip.by_index(i).map_err(|e| JardexError::ArchiveUnreadable {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            if !entry.is_dir() {
                names.push(entry.name().to_string());
            }
        }
        Ok(names)
    }

    pub fn contains(&mut self, name: &str) -> bool {
        self.zip.by_name(name).is_ok()
    }

    /// Read one entry's bytes. `NotFound` when the entry is absent,
    /// `ArchiveUnreadable` when the entry exists but cannot be read.
    pub fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, JardexError> {
        let mut entry = self
            .zip
            .by_name(name)
            .map_err(|_| JardexError::NotFound(format!("{name} in {}", self.path.display())))?;
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buf).map_err(|e| JardexError::ArchiveUnreadable {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        Ok(buf)
    }

    pub fn read_entry_string(&mut self, name: &str) -> Result<String, JardexError> {
        let bytes = self.read_entry(name)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn unreadable(&self, err: zip::result::ZipError) -> JardexError {
        JardexError::ArchiveUnreadable {
            path: self.path.clone(),
            reason: err.to_string(),
        }
    }
}
