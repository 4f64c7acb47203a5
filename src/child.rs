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

//! Coprocess launcher: wraps `pipe2`/`fork`/`dup2`/`execvp`/`waitpid` to
//! produce the two already-wired pipe endpoints the pump consumes, and
//! to reap the coprocess at the end.
//!
//! Generalizes the teacher crate's `Pipe`/`execute_piped_cmd_chain`
//! (an n-stage shell-pipeline builder) down to the one-child,
//! two-pipe shape a coprocess transform needs.

use std::ffi::CString;
use std::os::unix::io::RawFd;

use crate::error::{IoContext, Result};

/// A UNIX pipe, closed on drop unless both ends were already closed (or
/// handed off to a child via `dup2` and then closed in the parent).
#[derive(Debug)]
pub struct Pipe {
    read_fd: RawFd,
    write_fd: RawFd,
    read_closed: bool,
    write_closed: bool,
}

impl Pipe {
    pub fn new() -> Result<Self> {
        let mut fds: [libc::c_int; 2] = [0; 2];
        let res = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
        if res == -1 {
            return Err(std::io::Error::last_os_error()).context("pipe2", "<pipe>");
        }
        Ok(Self {
            read_fd: fds[0],
            write_fd: fds[1],
            read_closed: false,
            write_closed: false,
        })
    }

    pub fn read_fd(&self) -> RawFd {
        self.read_fd
    }

    pub fn write_fd(&self) -> RawFd {
        self.write_fd
    }

    pub fn close_read(&mut self) {
        if !self.read_closed {
            unsafe { libc::close(self.read_fd) };
            self.read_closed = true;
        }
    }

    pub fn close_write(&mut self) {
        if !self.write_closed {
            unsafe { libc::close(self.write_fd) };
            self.write_closed = true;
        }
    }
}

impl Drop for Pipe {
    fn drop(&mut self) {
        self.close_read();
        self.close_write();
    }
}

/// A running coprocess: its pid and the parent-side ends of the two
/// pipes wired to its stdin/stdout.
pub struct Child {
    pid: libc::pid_t,
    /// Parent writes transformed-input bytes here; it is the child's stdin.
    pub stdin_write: Pipe,
    /// Parent reads transformed-output bytes here; it is the child's stdout.
    pub stdout_read: Pipe,
}

impl Child {
    /// Forks and execs `argv[0]` with `argv` as its arguments, wiring a
    /// fresh stdin-pipe and stdout-pipe to it. `argv` must be non-empty.
    pub fn spawn(argv: &[String]) -> Result<Self> {
        assert!(!argv.is_empty(), "coprocess argv must not be empty");

        let mut stdin_pipe = Pipe::new()?;
        let mut stdout_pipe = Pipe::new()?;

        let pid = unsafe { libc::fork() };
        if pid == -1 {
            return Err(std::io::Error::last_os_error()).context("fork", "<coprocess>");
        }

        if pid == 0 {
            // Child: stdin <- stdin_pipe read end, stdout -> stdout_pipe write end.
            unsafe {
                libc::dup2(stdin_pipe.read_fd(), libc::STDIN_FILENO);
                libc::dup2(stdout_pipe.write_fd(), libc::STDOUT_FILENO);
            }
            stdin_pipe.close_read();
            stdin_pipe.close_write();
            stdout_pipe.close_read();
            stdout_pipe.close_write();

            let exec_argv = to_c_argv(argv);
            unsafe {
                libc::execvp(exec_argv[0], exec_argv.as_ptr());
            }
            // execvp only returns on failure.
            let err = std::io::Error::last_os_error();
            eprintln!("{}: {}", argv[0], err);
            std::process::exit(127);
        }

        // Parent: drop the ends the child owns.
        stdin_pipe.close_read();
        stdout_pipe.close_write();

        Ok(Self {
            pid,
            stdin_write: stdin_pipe,
            stdout_read: stdout_pipe,
        })
    }

    /// Blocks until the coprocess exits, translating the wait status the
    /// way the teacher's `update_process_states` does, but returning a
    /// `Result` instead of panicking on failure.
    pub fn wait(&mut self) -> Result<std::process::ExitStatus> {
        use std::os::unix::process::ExitStatusExt;

        let mut status: libc::c_int = 0;
        loop {
            let ret = unsafe { libc::waitpid(self.pid, &mut status, 0) };
            if ret == -1 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err).context("waitpid", "<coprocess>");
            }
            break;
        }
        Ok(std::process::ExitStatus::from_raw(status))
    }

    pub fn pid(&self) -> libc::pid_t {
        self.pid
    }
}

fn to_c_argv(argv: &[String]) -> Vec<*const libc::c_char> {
    // Leaked intentionally: exec() replaces the address space on success,
    // and on failure the process exits immediately after, so there is no
    // window in which reclaiming this memory would matter.
    let cstrings: Vec<CString> = argv.iter().map(|s| CString::new(s.as_str()).unwrap()).collect();
    let mut out: Vec<*const libc::c_char> = cstrings.iter().map(|c| c.as_ptr()).collect();
    out.push(std::ptr::null());
    std::mem::forget(cstrings);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_true_exits_zero() {
        let mut child = Child::spawn(&["true".to_string()]).unwrap();
        let status = child.wait().unwrap();
        assert_eq!(status.code(), Some(0));
    }

    #[test]
    fn spawn_false_exits_nonzero() {
        let mut child = Child::spawn(&["false".to_string()]).unwrap();
        let status = child.wait().unwrap();
        assert_ne!(status.code(), Some(0));
    }

    #[test]
    fn stdin_stdout_round_trip_through_cat() {
        let mut child = Child::spawn(&["cat".to_string()]).unwrap();
        let data = b"roundtrip";
        unsafe {
            let n = libc::write(
                child.stdin_write.write_fd(),
                data.as_ptr() as *const libc::c_void,
                data.len(),
            );
            assert_eq!(n as usize, data.len());
        }
        child.stdin_write.close_write();

        let mut buf = [0u8; 32];
        let n = unsafe {
            libc::read(
                child.stdout_read.read_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
            )
        };
        assert_eq!(&buf[..n as usize], data);
        let _ = child.wait().unwrap();
    }
}
