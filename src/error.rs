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

//! Unified error type for the crate.
//!
//! Mirrors the taxonomy from the design: plain I/O failures, I/O failures
//! tied to a specific named endpoint, scheduler deadlock, coprocess
//! failure, and CLI/config validation errors.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A bare I/O failure with no endpoint context attached yet.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An I/O failure tied to a named primitive and endpoint, so the
    /// diagnostic can say *which* read/write/splice/sendfile/fallocate
    /// call failed and against what.
    #[error("{op} on {path} failed: {source}")]
    IoAt {
        op: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },

    /// The interest set went empty without the termination predicate
    /// firing: the scheduler is holding data it can never drain.
    #[error(
        "buffer exhaustion: {input}({input_pos}) -> coprocess (buffer = {input_used}) | \
         {output}({output_pos}) <- coprocess (buffer = {output_used})"
    )]
    Deadlock {
        input: String,
        input_pos: u64,
        input_used: usize,
        output: String,
        output_pos: u64,
        output_used: usize,
    },

    /// The coprocess exited non-zero and produced no output; the
    /// original file (if any) was left untouched.
    #[error("coprocess exited with status {status}")]
    CoprocessFailed { status: i32 },

    /// CLI argument / redirect validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// Rename-on-success pre-validation or the rename call itself failed.
    #[error("cannot rename {from} to {to}: {source}")]
    Rename {
        from: String,
        to: String,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Small helper so call sites can turn a bare `io::Result` into an
/// `IoAt` error that names the failing primitive and endpoint, instead
/// of losing that context behind the blanket `Io` variant.
pub(crate) trait IoContext<T> {
    fn context(self, op: &'static str, path: &str) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn context(self, op: &'static str, path: &str) -> Result<T> {
        self.map_err(|source| Error::IoAt {
            op,
            path: path.to_string(),
            source,
        })
    }
}
