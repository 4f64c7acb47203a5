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

//! The validated configuration a single run is driven by. Built once,
//! from already-open `Endpoint`s, and consumed read-only from then on —
//! no ambient/global state, per the design's explicit rejection of the
//! original's process-global option parsing.

use std::path::PathBuf;

use crate::endpoint::Endpoint;

#[derive(Debug, Clone)]
pub struct Config {
    /// True iff input and output are the same regular file.
    pub overwrite: bool,
    /// True iff the output was opened/configured in append mode.
    pub append: bool,
    /// Eagerly punch holes in the input file behind the read cursor.
    pub punchhole: bool,
    /// The input file's size at pump entry, used only when
    /// `overwrite && append`, to cap reads to pre-existing bytes.
    pub input_original_size: Option<u64>,
    /// Rename the output file to this path on successful completion.
    pub rename_to: Option<PathBuf>,
}

impl Config {
    /// Derives a `Config` from the two endpoints and the flags the CLI
    /// (or a caller embedding this crate) gathered. Pure: does no I/O
    /// beyond what the `Endpoint`s already captured at construction.
    pub fn derive(
        input: &Endpoint,
        output: &Endpoint,
        append: bool,
        punchhole: bool,
        rename_to: Option<PathBuf>,
    ) -> Self {
        let overwrite = input.same_file(output);
        Self {
            overwrite,
            append,
            punchhole,
            input_original_size: if overwrite && append {
                Some(input.size())
            } else {
                None
            },
            rename_to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;

    #[test]
    fn overwrite_detected_for_shared_file() {
        let f = tempfile::NamedTempFile::new().unwrap();
        let fd2 = unsafe { libc::dup(f.as_raw_fd()) };
        let input = Endpoint::from_fd(f.as_raw_fd(), "in").unwrap();
        let output = Endpoint::from_fd(fd2, "out").unwrap();
        let cfg = Config::derive(&input, &output, false, false, None);
        assert!(cfg.overwrite);
        assert!(cfg.input_original_size.is_none());
        unsafe { libc::close(fd2) };
    }

    #[test]
    fn overwrite_append_captures_original_size() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"abcdef").unwrap();
        let fd2 = unsafe { libc::dup(f.as_raw_fd()) };
        let input = Endpoint::from_fd(f.as_raw_fd(), "in").unwrap();
        let output = Endpoint::from_fd(fd2, "out").unwrap();
        let cfg = Config::derive(&input, &output, true, false, None);
        assert!(cfg.overwrite);
        assert_eq!(cfg.input_original_size, Some(6));
        unsafe { libc::close(fd2) };
    }

    #[test]
    fn distinct_files_are_not_overwrite() {
        let a_file = tempfile::NamedTempFile::new().unwrap();
        let b_file = tempfile::NamedTempFile::new().unwrap();
        let a = Endpoint::from_fd(a_file.as_raw_fd(), "a").unwrap();
        let b = Endpoint::from_fd(b_file.as_raw_fd(), "b").unwrap();
        let cfg = Config::derive(&a, &b, false, false, None);
        assert!(!cfg.overwrite);
    }
}
