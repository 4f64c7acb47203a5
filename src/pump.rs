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

//! The duplex pump scheduler — the heart of the crate.
//!
//! A single-threaded, cooperative event loop multiplexing four
//! descriptors (input file, output file, pipe-to-child, pipe-from-child)
//! with two contiguous buffers and a read-ahead invariant that licenses
//! output writes only when it is safe to do so.
//!
//! Grounded in `original_source/ow.c`'s `select`-based main loop,
//! translated one-for-one onto `poll` and explicit `Result` returns
//! instead of `exit()`.

use std::os::unix::io::RawFd;

use log::{debug, warn};

use crate::child::Pipe;
use crate::config::Config;
use crate::endpoint::Endpoint;
use crate::error::{Error, IoContext, Result};

/// A contiguous (non-circular) byte buffer with a fill count, matching
/// the original's `memmove`-on-partial-write shape.
#[derive(Debug)]
struct RingBuf {
    data: Vec<u8>,
    used: usize,
}

impl RingBuf {
    fn with_capacity(cap: usize) -> Self {
        Self {
            data: vec![0u8; cap.max(1)],
            used: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn spare(&self) -> usize {
        self.capacity() - self.used
    }

    fn spare_mut(&mut self) -> &mut [u8] {
        let used = self.used;
        &mut self.data[used..]
    }

    fn filled(&self) -> &[u8] {
        &self.data[..self.used]
    }

    fn grow(&mut self, n: usize) {
        self.used += n;
    }

    /// Drops the first `n` bytes, shifting the remainder to the origin —
    /// the Rust equivalent of the original's `memmove(buf, buf+sz, used-sz)`.
    fn consume(&mut self, n: usize) {
        self.data.copy_within(n..self.used, 0);
        self.used -= n;
    }
}

/// Final byte counts the pump reached at termination.
#[derive(Debug, Clone, Copy)]
pub struct PumpOutcome {
    pub ipos: u64,
    pub opos: u64,
}

/// Drives one in-place transform from `input` through the coprocess
/// pipes to `output`.
pub struct Pump<'a> {
    input: &'a Endpoint,
    output: &'a Endpoint,
    stdin_write: &'a mut Pipe,
    cr: RawFd,

    in_buf: RingBuf,
    out_buf: RingBuf,

    ipos: u64,
    opos: u64,
    ieof: bool,
    oeof: bool,
    iclosed: bool,

    overwrite: bool,
    append: bool,
    punchhole: bool,
    input_original_size: Option<u64>,
}

impl<'a> Pump<'a> {
    pub fn new(
        input: &'a Endpoint,
        output: &'a Endpoint,
        stdin_write: &'a mut Pipe,
        stdout_read: &Pipe,
        config: &Config,
    ) -> Self {
        let opos = if config.append { output.size() } else { 0 };
        let cr = stdout_read.read_fd();
        Self {
            input,
            output,
            stdin_write,
            cr,
            in_buf: RingBuf::with_capacity(input.blksize()),
            out_buf: RingBuf::with_capacity(output.blksize()),
            ipos: 0,
            opos,
            ieof: false,
            oeof: false,
            iclosed: false,
            overwrite: config.overwrite,
            append: config.append,
            punchhole: config.punchhole,
            input_original_size: config.input_original_size,
        }
    }

    /// Runs the pump to completion: until both streams are drained, or a
    /// deadlock/I-O error is detected.
    pub fn run(&mut self) -> Result<PumpOutcome> {
        loop {
            // 1. Close gate.
            if self.ieof && self.in_buf.used == 0 && !self.iclosed {
                self.stdin_write.close_write();
                self.iclosed = true;
                debug!("pump: input drained, closed coprocess stdin");
            }

            // 2. Termination.
            if self.oeof && self.out_buf.used == 0 {
                debug!(
                    "pump: complete, ipos={} opos={}",
                    self.ipos, self.opos
                );
                return Ok(PumpOutcome {
                    ipos: self.ipos,
                    opos: self.opos,
                });
            }

            // 3. Interest set.
            let want_read_if = !self.ieof && self.in_buf.spare() > 0;
            let want_write_cw = self.in_buf.used > 0 && !self.iclosed;
            let want_read_cr = !self.oeof && self.out_buf.spare() > 0;
            let want_write_of = self.out_buf.used > 0
                && (!self.overwrite || self.append || self.ieof || self.ipos > self.opos);

            if !want_read_if && !want_write_cw && !want_read_cr && !want_write_of {
                warn!(
                    "pump: deadlock, {}({}/used={}) -> coprocess, {}({}/used={}) <- coprocess",
                    self.input.label(),
                    self.ipos,
                    self.in_buf.used,
                    self.output.label(),
                    self.opos,
                    self.out_buf.used
                );
                return Err(Error::Deadlock {
                    input: self.input.label().to_string(),
                    input_pos: self.ipos,
                    input_used: self.in_buf.used,
                    output: self.output.label().to_string(),
                    output_pos: self.opos,
                    output_used: self.out_buf.used,
                });
            }

            // 5. Multiplex-wait (no timeout).
            let ready = self.poll_ready(want_read_if, want_write_cw, want_read_cr, want_write_of)?;

            // 6. Action selection: cw-write, cr-read, if-read, of-write.
            if ready.write_cw {
                self.do_write_cw()?;
            } else if ready.read_cr {
                self.do_read_cr()?;
            } else if ready.read_if {
                self.do_read_if()?;
            } else if ready.write_of {
                self.do_write_of()?;
            }
        }
    }

    fn poll_ready(
        &self,
        want_read_if: bool,
        want_write_cw: bool,
        want_read_cr: bool,
        want_write_of: bool,
    ) -> Result<Ready> {
        let mut fds: Vec<libc::pollfd> = Vec::with_capacity(4);
        let mut slots: Vec<Slot> = Vec::with_capacity(4);

        if want_read_if {
            fds.push(pollfd(self.input.fd(), libc::POLLIN));
            slots.push(Slot::ReadIf);
        }
        if want_write_cw {
            fds.push(pollfd(self.stdin_write.write_fd(), libc::POLLOUT));
            slots.push(Slot::WriteCw);
        }
        if want_read_cr {
            fds.push(pollfd(self.cr, libc::POLLIN));
            slots.push(Slot::ReadCr);
        }
        if want_write_of {
            fds.push(pollfd(self.output.fd(), libc::POLLOUT));
            slots.push(Slot::WriteOf);
        }

        let n = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if n == -1 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(Ready::default());
            }
            return Err(err).context("poll", "<pump>");
        }

        let mut ready = Ready::default();
        for (pfd, slot) in fds.iter().zip(slots.iter()) {
            if pfd.revents & (pfd.events | libc::POLLHUP | libc::POLLERR) == 0 {
                continue;
            }
            match slot {
                Slot::ReadIf => ready.read_if = true,
                Slot::WriteCw => ready.write_cw = true,
                Slot::ReadCr => ready.read_cr = true,
                Slot::WriteOf => ready.write_of = true,
            }
        }
        Ok(ready)
    }

    fn do_read_if(&mut self) -> Result<()> {
        let mut want = self.in_buf.spare();
        if self.overwrite && self.append {
            if let Some(orig) = self.input_original_size {
                let remaining = orig.saturating_sub(self.ipos);
                want = want.min(remaining as usize);
            }
        }
        if want == 0 {
            // Nothing left to read under the append cap; treat as EOF.
            self.ieof = true;
            return Ok(());
        }
        let n = raw_read(self.input.fd(), &mut self.in_buf.spare_mut()[..want])
            .context("read", self.input.label())?;
        if n == 0 {
            self.ieof = true;
            debug!("pump: input eof at ipos={}", self.ipos);
            return Ok(());
        }
        if self.punchhole {
            punch_hole(self.input.fd(), self.ipos, n as u64).context("fallocate", self.input.label())?;
        }
        self.ipos += n as u64;
        self.in_buf.grow(n);
        debug!("pump: read {} bytes from input, ipos={}", n, self.ipos);
        Ok(())
    }

    fn do_write_cw(&mut self) -> Result<()> {
        let n = raw_write(self.stdin_write.write_fd(), self.in_buf.filled())
            .context("write", "<coprocess stdin>")?;
        self.in_buf.consume(n);
        debug!("pump: wrote {} bytes to coprocess stdin", n);
        Ok(())
    }

    fn do_read_cr(&mut self) -> Result<()> {
        let spare = self.out_buf.spare();
        let n = raw_read(self.cr, &mut self.out_buf.spare_mut()[..spare])
            .context("read", "<coprocess stdout>")?;
        if n == 0 {
            self.oeof = true;
            debug!("pump: coprocess stdout eof");
            return Ok(());
        }
        self.out_buf.grow(n);
        debug!("pump: read {} bytes from coprocess stdout", n);
        Ok(())
    }

    fn do_write_of(&mut self) -> Result<()> {
        let mut wsize = self.out_buf.used;
        if self.overwrite && !self.append && !self.ieof {
            let allowed = self.ipos.saturating_sub(self.opos);
            wsize = wsize.min(allowed as usize);
        }
        if wsize == 0 {
            return Ok(());
        }
        let n = raw_write(self.output.fd(), &self.out_buf.filled()[..wsize])
            .context("write", self.output.label())?;
        self.out_buf.consume(n);
        self.opos += n as u64;
        debug!("pump: wrote {} bytes to output, opos={}", n, self.opos);
        Ok(())
    }
}

#[derive(Default)]
struct Ready {
    read_if: bool,
    write_cw: bool,
    read_cr: bool,
    write_of: bool,
}

enum Slot {
    ReadIf,
    WriteCw,
    ReadCr,
    WriteOf,
}

fn pollfd(fd: RawFd, events: libc::c_short) -> libc::pollfd {
    libc::pollfd {
        fd,
        events,
        revents: 0,
    }
}

fn raw_read(fd: RawFd, buf: &mut [u8]) -> std::io::Result<usize> {
    let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
    if n == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

fn raw_write(fd: RawFd, buf: &[u8]) -> std::io::Result<usize> {
    let n = unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
    if n == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

fn punch_hole(fd: RawFd, offset: u64, len: u64) -> std::io::Result<()> {
    let ret = unsafe {
        libc::fallocate(
            fd,
            libc::FALLOC_FL_PUNCH_HOLE | libc::FALLOC_FL_KEEP_SIZE,
            offset as libc::off_t,
            len as libc::off_t,
        )
    };
    if ret == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ringbuf_consume_shifts_remainder() {
        let mut rb = RingBuf::with_capacity(8);
        rb.spare_mut()[..5].copy_from_slice(b"abcde");
        rb.grow(5);
        rb.consume(2);
        assert_eq!(rb.filled(), b"cde");
        assert_eq!(rb.used, 3);
    }

    #[test]
    fn ringbuf_spare_tracks_capacity() {
        let mut rb = RingBuf::with_capacity(4);
        assert_eq!(rb.spare(), 4);
        rb.grow(3);
        assert_eq!(rb.spare(), 1);
    }
}
