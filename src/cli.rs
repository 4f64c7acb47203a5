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

//! Command-line surface: flags clap understands directly, plus the
//! trailing coprocess argv. Redirect tokens (`<file`, `>file`, ...) are
//! stripped out of argv by [`crate::redirect::extract`] before this
//! struct ever sees it.
//!
//! Grounded in the `rdd` teacher's `cli.rs`.

use std::path::PathBuf;

use clap::Parser;

/// Runs a program as a coprocess and pumps a file's bytes through it,
/// writing the transformed bytes back without ever writing ahead of
/// what has been read.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Input file. Defaults to stdin if omitted.
    #[arg(short = 'i', long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Output file. Defaults to stdout if omitted.
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Use the same file for both input and output.
    #[arg(short = 'f', long = "inout", value_name = "FILE", conflicts_with_all = ["input", "output"])]
    pub inout: Option<PathBuf>,

    /// Rename the output file to this path once the coprocess has
    /// exited successfully.
    #[arg(short = 'r', long, value_name = "FILE")]
    pub rename: Option<PathBuf>,

    /// Append to the output instead of overwriting it from the start.
    #[arg(short = 'a', long)]
    pub append: bool,

    /// Punch holes in the input file as it is consumed, so overwriting
    /// a large file in place does not require the disk space for both
    /// copies at once.
    #[arg(short = 'p', long)]
    pub punchhole: bool,

    /// The coprocess and its arguments. Empty means pass the input
    /// straight through to the output with no transform.
    #[arg(trailing_var_arg = true)]
    pub command: Vec<String>,
}
