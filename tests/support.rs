//! Shared helpers for the end-to-end tests: write a scratch file, run
//! the real `ow` binary against it, and read the result back.

use std::io::Write;
use std::process::{Command, Output};

use tempfile::NamedTempFile;

pub fn scratch_file(contents: &[u8]) -> NamedTempFile {
    let mut f = NamedTempFile::new().expect("create scratch file");
    f.write_all(contents).expect("write scratch contents");
    f.flush().expect("flush scratch contents");
    f
}

/// Runs the `ow` binary with `args`, returning its captured output.
pub fn run_ow(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ow"))
        .args(args)
        .output()
        .expect("spawn ow")
}

pub fn read(path: &std::path::Path) -> Vec<u8> {
    std::fs::read(path).expect("read result file")
}
