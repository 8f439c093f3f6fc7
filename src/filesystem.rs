// This file is part of the syzygy-probe library.
// Copyright (C) 2017-2021 Niklas Fiekas <niklas.fiekas@backscattering.de>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

//! Traits to provide a custom filesystem implementation.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use positioned_io::ReadAt as _;

/// An abstract filesystem.
pub trait Filesystem: Send + Sync {
    /// Determines the size in bytes of the given file.
    ///
    /// Follows symbolic links.
    ///
    /// # Errors
    ///
    /// See [`std::fs::metadata()`]. Additionally errors if `path` does not
    /// ultimately point to a regular file.
    fn regular_file_size(&self, path: &Path) -> io::Result<u64>;

    /// Returns a list of files in the given directory.
    ///
    /// # Errors
    ///
    /// See [`std::fs::read_dir()`].
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Opens the given file, returning a handle for random read requests.
    ///
    /// # Errors
    ///
    /// See [`std::fs::File::open()`].
    fn open(&self, path: &Path) -> io::Result<Box<dyn RandomAccessFile>>;
}

/// The purpose of a read. Advisory only.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum ReadHint {
    /// Reading metadata from the table file header.
    Header,
    /// Reading to sparse index to jump close to the correct entry in the block
    /// length table.
    SparseIndex,
    /// Reading the block length table.
    BlockLengths,
    /// Reading a compressed block.
    Data,
    /// Reading the DTZ value map.
    DtzMap,
}

/// An abstract randomly readable file.
pub trait RandomAccessFile: Send + Sync {
    /// Reads some bytes starting from a given offset.
    ///
    /// See [`std::os::unix::fs::FileExt::read_at()`] for precise semantics.
    fn read_at(&self, hint: ReadHint, pos: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Reads the exact number of bytes required to fill `buf` from the given
    /// offset.
    ///
    /// See [`std::os::unix::fs::FileExt::read_exact_at()`] for
    /// precise semantics.
    fn read_exact_at(&self, hint: ReadHint, mut pos: u64, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(hint, pos, buf) {
                Ok(0) => break,
                Ok(n) => {
                    let tmp = buf;
                    buf = &mut tmp[n..];
                    pos += n as u64;
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        if !buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "failed to fill whole buffer",
            ));
        }
        Ok(())
    }

    /// Reads the single byte at a given offset.
    fn read_u8_at(&self, hint: ReadHint, pos: u64) -> io::Result<u8> {
        let mut buf = [0];
        self.read_exact_at(hint, pos, &mut buf[..])?;
        Ok(buf[0])
    }

    /// Reads two bytes at a given offset, returning an integer in little
    /// endian.
    fn read_u16_le_at(&self, hint: ReadHint, pos: u64) -> io::Result<u16> {
        let mut buf = [0; 2];
        self.read_exact_at(hint, pos, &mut buf[..])?;
        Ok(u16::from_le_bytes(buf))
    }
}

fn regular_file_size(path: &Path) -> io::Result<u64> {
    let meta = path.metadata()?;
    if !meta.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        ));
    }
    Ok(meta.len())
}

fn read_dir(path: &Path) -> io::Result<Vec<PathBuf>> {
    fs::read_dir(path)?
        .map(|maybe_entry| maybe_entry.map(|entry| entry.path()))
        .collect()
}

/// A filesystem using positioned reads on the operating system's files.
#[derive(Debug, Default, Copy, Clone)]
pub struct OsFilesystem;

impl Filesystem for OsFilesystem {
    fn regular_file_size(&self, path: &Path) -> io::Result<u64> {
        regular_file_size(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        read_dir(path)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn RandomAccessFile>> {
        let file = fs::File::open(path)?;

        #[cfg(target_os = "linux")]
        {
            use std::os::unix::io::AsRawFd as _;
            // Table reads jump around. Errors only cost performance.
            let _ = unsafe { libc::posix_fadvise(file.as_raw_fd(), 0, 0, libc::POSIX_FADV_RANDOM) };
        }

        Ok(Box::new(OsRandomAccessFile {
            inner: positioned_io::RandomAccessFile::try_new(file)?,
        }))
    }
}

struct OsRandomAccessFile {
    inner: positioned_io::RandomAccessFile,
}

impl RandomAccessFile for OsRandomAccessFile {
    fn read_at(&self, _hint: ReadHint, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read_at(pos, buf)
    }
}

/// A filesystem that memory maps table files.
///
/// # Safety
///
/// Changes to the underlying files while they are mapped are undefined
/// behavior. Table files must not be modified or truncated while the
/// filesystem is in use.
#[cfg(feature = "mmap")]
#[cfg_attr(docs_rs, doc(cfg(feature = "mmap")))]
#[derive(Debug)]
pub struct MmapFilesystem {
    _priv: (),
}

#[cfg(feature = "mmap")]
impl MmapFilesystem {
    /// Creates the filesystem.
    ///
    /// # Safety
    ///
    /// See [`MmapFilesystem`].
    pub unsafe fn new() -> MmapFilesystem {
        MmapFilesystem { _priv: () }
    }
}

#[cfg(feature = "mmap")]
impl Filesystem for MmapFilesystem {
    fn regular_file_size(&self, path: &Path) -> io::Result<u64> {
        regular_file_size(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        read_dir(path)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn RandomAccessFile>> {
        let file = fs::File::open(path)?;
        // Safety: Guaranteed by the caller of MmapFilesystem::new().
        let mmap = unsafe { memmap2::MmapOptions::new().map(&file)? };

        #[cfg(unix)]
        mmap.advise(memmap2::Advice::Random)?;

        Ok(Box::new(MmapRandomAccessFile { mmap }))
    }
}

#[cfg(feature = "mmap")]
struct MmapRandomAccessFile {
    mmap: memmap2::Mmap,
}

#[cfg(feature = "mmap")]
impl RandomAccessFile for MmapRandomAccessFile {
    fn read_at(&self, _hint: ReadHint, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        let start = usize::try_from(pos).map_or(self.mmap.len(), |p| p.min(self.mmap.len()));
        let available = &self.mmap[start..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }
}
