/*
    MIT License

    Copyright (c) 2020 Philipp Schuster

    Permission is hereby granted, free of charge, to any person obtaining a copy
    of this software and associated documentation files (the "Software"), to deal
    in the Software without restriction, including without limitation the rights
    to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
    copies of the Software, and to permit persons to whom the Software is
    furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in all
    copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
    OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
    SOFTWARE.
*/

//! The data model for an open byte stream: its file-type classification,
//! preferred block size, and — for regular files — its current logical
//! size and `(device, inode)` identity.

use std::os::unix::io::RawFd;

use crate::error::{IoContext, Result};

/// Coarse classification of what kind of file descriptor we are looking
/// at. Only the distinctions the scheduler and selector actually care
/// about are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Regular,
    Fifo,
    CharDevice,
    Other,
}

/// A handle onto an open byte stream, tagged by kind and carrying the
/// metadata the pump and the bulk-transfer selector need.
#[derive(Debug, Clone)]
pub struct Endpoint {
    fd: RawFd,
    kind: EndpointKind,
    /// Preferred I/O block size (`st_blksize`); also used to size the
    /// buffer the pump allocates for this endpoint.
    blksize: usize,
    /// Current logical size, only meaningful for `EndpointKind::Regular`.
    size: u64,
    dev: u64,
    ino: u64,
    /// Human-readable name for diagnostics: the configured path, or
    /// `<stdin>`/`<stdout>` when the descriptor was inherited.
    label: String,
}

impl Endpoint {
    /// Builds an `Endpoint` from an already-open descriptor via `fstat`.
    pub fn from_fd(fd: RawFd, label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        let st = fstat(fd).context("fstat", &label)?;

        let kind = if (st.st_mode & libc::S_IFMT) == libc::S_IFREG {
            EndpointKind::Regular
        } else if (st.st_mode & libc::S_IFMT) == libc::S_IFIFO {
            EndpointKind::Fifo
        } else if (st.st_mode & libc::S_IFMT) == libc::S_IFCHR {
            EndpointKind::CharDevice
        } else {
            EndpointKind::Other
        };

        Ok(Self {
            fd,
            kind,
            blksize: st.st_blksize.max(1) as usize,
            size: if kind == EndpointKind::Regular {
                st.st_size as u64
            } else {
                0
            },
            dev: st.st_dev as u64,
            ino: st.st_ino as u64,
            label,
        })
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    pub fn blksize(&self) -> usize {
        self.blksize
    }

    /// Current logical size. Only meaningful for regular files; callers
    /// must check `kind()` first.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// True iff both endpoints are regular files sharing the same
    /// `(device, inode)` pair — the same-file overwrite case.
    pub fn same_file(&self, other: &Endpoint) -> bool {
        self.kind == EndpointKind::Regular
            && other.kind == EndpointKind::Regular
            && self.dev == other.dev
            && self.ino == other.ino
    }

    /// Reads the current `O_APPEND` state of the underlying descriptor.
    pub fn is_append(&self) -> Result<bool> {
        let flags = unsafe { libc::fcntl(self.fd, libc::F_GETFL) };
        if flags == -1 {
            return Err(std::io::Error::last_os_error())
                .context("fcntl(F_GETFL)", &self.label);
        }
        Ok((flags & libc::O_APPEND) != 0)
    }
}

fn fstat(fd: RawFd) -> std::io::Result<libc::stat> {
    unsafe {
        let mut st: libc::stat = std::mem::zeroed();
        if libc::fstat(fd, &mut st) == -1 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(st)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::AsRawFd;

    #[test]
    fn classifies_regular_file_and_reports_size() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        f.write_all(b"hello").unwrap();
        let ep = Endpoint::from_fd(f.as_raw_fd(), "test").unwrap();
        assert_eq!(ep.kind(), EndpointKind::Regular);
        assert_eq!(ep.size(), 5);
        assert!(ep.blksize() > 0);
    }

    #[test]
    fn same_file_detects_shared_inode() {
        let f = tempfile::NamedTempFile::new().unwrap();
        let fd2 = unsafe { libc::dup(f.as_raw_fd()) };
        let a = Endpoint::from_fd(f.as_raw_fd(), "a").unwrap();
        let b = Endpoint::from_fd(fd2, "b").unwrap();
        assert!(a.same_file(&b));
        unsafe { libc::close(fd2) };
    }

    #[test]
    fn distinct_files_are_not_same_file() {
        let a_file = tempfile::NamedTempFile::new().unwrap();
        let b_file = tempfile::NamedTempFile::new().unwrap();
        let a = Endpoint::from_fd(a_file.as_raw_fd(), "a").unwrap();
        let b = Endpoint::from_fd(b_file.as_raw_fd(), "b").unwrap();
        assert!(!a.same_file(&b));
    }
}
