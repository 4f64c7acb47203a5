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

//! Bulk transfer primitives and the selector that picks among them.
//!
//! Three size-bounded unidirectional file-to-file copies, identical in
//! contract: transfer at most `cap` bytes, stopping at end-of-input or
//! `cap`, whichever comes first. Short reads/writes are loop
//! continuations, not errors.

use std::os::unix::io::RawFd;

use crate::endpoint::{Endpoint, EndpointKind};
use crate::error::{IoContext, Result};

/// A scratch buffer at least as large as the typical pipe atomic-write
/// size, used by the portable read/write fallback.
const BYTE_COPY_BUF: usize = 65536;

/// Portable read/write loop. Valid for any pair of descriptors.
pub fn byte_copy(src: RawFd, src_label: &str, dst: RawFd, dst_label: &str, cap: u64) -> Result<u64> {
    let mut buf = vec![0u8; BYTE_COPY_BUF];
    let mut transferred: u64 = 0;

    while transferred < cap {
        let want = std::cmp::min(cap - transferred, buf.len() as u64) as usize;
        if want == 0 {
            break;
        }
        let n = read_fd(src, &mut buf[..want]).context("read", src_label)?;
        if n == 0 {
            break;
        }
        write_all_fd(dst, &buf[..n], dst_label)?;
        transferred += n as u64;
    }
    Ok(transferred)
}

/// Zero-copy pipe-to/from-anything primitive. Valid only when at least
/// one endpoint is a pipe/FIFO.
pub fn pipe_splice(src: RawFd, src_label: &str, dst: RawFd, dst_label: &str, cap: u64) -> Result<u64> {
    let mut transferred: u64 = 0;
    while transferred < cap {
        let want = std::cmp::min(cap - transferred, usize::MAX as u64) as usize;
        if want == 0 {
            break;
        }
        let n = unsafe {
            libc::splice(
                src,
                std::ptr::null_mut(),
                dst,
                std::ptr::null_mut(),
                want,
                0,
            )
        };
        if n == -1 {
            return Err(std::io::Error::last_os_error()).context("splice", src_label);
        }
        if n == 0 {
            break;
        }
        transferred += n as u64;
        let _ = dst_label;
    }
    Ok(transferred)
}

/// Regular-file-to-descriptor zero-copy primitive. Valid only when the
/// input is a regular file.
pub fn file_send(src: RawFd, src_label: &str, dst: RawFd, cap: u64) -> Result<u64> {
    let mut transferred: u64 = 0;
    while transferred < cap {
        let want = std::cmp::min(cap - transferred, isize::MAX as u64) as usize;
        if want == 0 {
            break;
        }
        let n = unsafe { libc::sendfile(dst, src, std::ptr::null_mut(), want) };
        if n == -1 {
            return Err(std::io::Error::last_os_error()).context("sendfile", src_label);
        }
        if n == 0 {
            break;
        }
        transferred += n as u64;
    }
    Ok(transferred)
}

/// Given two descriptors and their file-type metadata, selects and runs
/// the cheapest primitive consistent with correctness.
///
/// Selection rule (first match wins):
/// 1. `append` set -> byte-copy (append semantics interact poorly with
///    zero-copy primitives, and in overwrite-append mode the cap must
///    be the input's original size).
/// 2. either endpoint is a pipe/FIFO -> pipe-splice.
/// 3. input is a regular file -> file-send.
/// 4. otherwise -> byte-copy.
pub fn select_and_run(input: &Endpoint, output: &Endpoint, append: bool, cap: u64) -> Result<u64> {
    if append {
        return byte_copy(input.fd(), input.label(), output.fd(), output.label(), cap);
    }
    if input.kind() == EndpointKind::Fifo || output.kind() == EndpointKind::Fifo {
        return pipe_splice(input.fd(), input.label(), output.fd(), output.label(), cap);
    }
    if input.kind() == EndpointKind::Regular {
        return file_send(input.fd(), input.label(), output.fd(), cap);
    }
    byte_copy(input.fd(), input.label(), output.fd(), output.label(), cap)
}

fn read_fd(fd: RawFd, buf: &mut [u8]) -> std::io::Result<usize> {
    let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
    if n == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

fn write_all_fd(fd: RawFd, mut buf: &[u8], label: &str) -> Result<()> {
    while !buf.is_empty() {
        let n = unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
        if n == -1 {
            return Err(std::io::Error::last_os_error()).context("write", label);
        }
        buf = &buf[n as usize..];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom, Write};
    use std::os::unix::io::AsRawFd;

    #[test]
    fn byte_copy_transfers_whole_file() {
        let mut src = tempfile::NamedTempFile::new().unwrap();
        src.write_all(b"hello world").unwrap();
        src.as_file().sync_all().unwrap();
        src.as_file_mut().seek(SeekFrom::Start(0)).unwrap();

        let dst = tempfile::NamedTempFile::new().unwrap();
        let n = byte_copy(
            src.as_raw_fd(),
            "src",
            dst.as_raw_fd(),
            "dst",
            u64::MAX,
        )
        .unwrap();
        assert_eq!(n, 11);

        let mut out = String::new();
        std::fs::File::open(dst.path())
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn byte_copy_respects_cap() {
        let mut src = tempfile::NamedTempFile::new().unwrap();
        src.write_all(b"hello world").unwrap();
        src.as_file_mut().seek(SeekFrom::Start(0)).unwrap();
        let dst = tempfile::NamedTempFile::new().unwrap();
        let n = byte_copy(src.as_raw_fd(), "src", dst.as_raw_fd(), "dst", 5).unwrap();
        assert_eq!(n, 5);
    }

    #[test]
    fn select_and_run_picks_file_send_for_regular_to_regular() {
        let mut src = tempfile::NamedTempFile::new().unwrap();
        src.write_all(b"abc").unwrap();
        src.as_file_mut().seek(SeekFrom::Start(0)).unwrap();
        let dst = tempfile::NamedTempFile::new().unwrap();
        let input = Endpoint::from_fd(src.as_raw_fd(), "in").unwrap();
        let output = Endpoint::from_fd(dst.as_raw_fd(), "out").unwrap();
        let n = select_and_run(&input, &output, false, u64::MAX).unwrap();
        assert_eq!(n, 3);
    }
}
