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

//! Mode selector: chooses among pass-through, exec-replacement, and full
//! pump, exactly mirroring `ow.c`'s `main`-body dispatch.

use crate::config::Config;
use crate::endpoint::Endpoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// No coprocess: run the bulk transfer selector directly.
    PassThrough,
    /// Distinct input/output, no punch-hole, no rename: exec the
    /// coprocess with the descriptors as its stdin/stdout, bypassing
    /// the scheduler entirely.
    ExecReplace,
    /// Fork/exec the coprocess with two pipes and run the duplex pump.
    Pump,
}

pub fn select(config: &Config, input: &Endpoint, output: &Endpoint, has_command: bool) -> Mode {
    if !has_command {
        return Mode::PassThrough;
    }
    let distinct = !input.same_file(output);
    if distinct && !config.punchhole && config.rename_to.is_none() {
        return Mode::ExecReplace;
    }
    Mode::Pump
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::AsRawFd;

    fn endpoint(label: &str) -> (tempfile::NamedTempFile, Endpoint) {
        let f = tempfile::NamedTempFile::new().unwrap();
        let ep = Endpoint::from_fd(f.as_raw_fd(), label).unwrap();
        (f, ep)
    }

    #[test]
    fn no_command_is_pass_through() {
        let (_a, input) = endpoint("in");
        let (_b, output) = endpoint("out");
        let cfg = Config::derive(&input, &output, false, false, None);
        assert_eq!(select(&cfg, &input, &output, false), Mode::PassThrough);
    }

    #[test]
    fn distinct_files_with_command_is_exec_replace() {
        let (_a, input) = endpoint("in");
        let (_b, output) = endpoint("out");
        let cfg = Config::derive(&input, &output, false, false, None);
        assert_eq!(select(&cfg, &input, &output, true), Mode::ExecReplace);
    }

    #[test]
    fn same_file_with_command_is_pump() {
        let f = tempfile::NamedTempFile::new().unwrap();
        let fd2 = unsafe { libc::dup(f.as_raw_fd()) };
        let input = Endpoint::from_fd(f.as_raw_fd(), "in").unwrap();
        let output = Endpoint::from_fd(fd2, "out").unwrap();
        let cfg = Config::derive(&input, &output, false, false, None);
        assert_eq!(select(&cfg, &input, &output, true), Mode::Pump);
        unsafe { libc::close(fd2) };
    }

    #[test]
    fn distinct_files_with_rename_is_pump() {
        let (_a, input) = endpoint("in");
        let (_b, output) = endpoint("out");
        let cfg = Config::derive(&input, &output, false, false, Some("x".into()));
        assert_eq!(select(&cfg, &input, &output, true), Mode::Pump);
    }

    #[test]
    fn distinct_files_with_punchhole_is_pump() {
        let (_a, input) = endpoint("in");
        let (_b, output) = endpoint("out");
        let cfg = Config::derive(&input, &output, false, true, None);
        assert_eq!(select(&cfg, &input, &output, true), Mode::Pump);
    }
}
