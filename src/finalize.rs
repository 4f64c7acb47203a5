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

//! Finalization: on pump completion and coprocess exit, truncate the
//! output to the written length when overwriting, rename if requested,
//! and compute the process's own exit code from the child's status.
//!
//! Grounded in `ow.c`'s post-`wait()` tail: `opos > 0 || status == 0`
//! gates the commit; otherwise the original file is left untouched.

use std::os::unix::io::RawFd;
use std::path::Path;
use std::process::ExitStatus;

use log::warn;

use crate::config::Config;
use crate::endpoint::Endpoint;
use crate::error::{Error, IoContext, Result};

/// Applies the commit actions (truncate, rename) if the run produced
/// output or the coprocess succeeded, and returns the exit code the
/// process should report.
pub fn commit(opos: u64, status: ExitStatus, config: &Config, output: &Endpoint) -> Result<i32> {
    let code = status.code().unwrap_or(128);
    let produced_output = opos > 0;
    let succeeded = status.success();

    if !succeeded && !produced_output {
        // Coprocess-failure: propagate the status, but the output is
        // left exactly as it was — no truncation, no rename.
        let err = Error::CoprocessFailed { status: code };
        warn!("{}", err);
        return Ok(code);
    }

    if config.overwrite {
        truncate(output.fd(), opos).context("ftruncate", output.label())?;
    }

    if let Some(rename_to) = &config.rename_to {
        rename(output.label(), rename_to)?;
    }

    Ok(code)
}

/// Pre-validates a requested rename the way `ow.c`'s `main` does before
/// starting any transfer: the output must be a regular file, the
/// rename target must live on the same filesystem, must not already be
/// a directory, and must not be the output file itself.
pub fn validate_rename(output: &Endpoint, rename_to: &Path) -> Result<()> {
    use crate::endpoint::EndpointKind;

    if output.kind() != EndpointKind::Regular {
        return Err(Error::Config(
            "cannot rename a non-regular output".to_string(),
        ));
    }

    match std::fs::symlink_metadata(rename_to) {
        Ok(meta) => {
            if meta.is_dir() {
                return Err(Error::Config(format!(
                    "rename target {} is a directory",
                    rename_to.display()
                )));
            }
            same_filesystem_or_err(output, rename_to)?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let dir = rename_to.parent().filter(|p| !p.as_os_str().is_empty());
            let dir = dir.unwrap_or_else(|| Path::new("."));
            if !dir.is_dir() {
                return Err(Error::Config(format!(
                    "rename target directory {} does not exist",
                    dir.display()
                )));
            }
        }
        Err(e) => {
            return Err(e).context("lstat", &rename_to.display().to_string());
        }
    }
    Ok(())
}

fn same_filesystem_or_err(output: &Endpoint, rename_to: &Path) -> Result<()> {
    use std::os::unix::fs::MetadataExt;
    let target_meta = std::fs::symlink_metadata(rename_to)
        .context("lstat", &rename_to.display().to_string())?;
    let output_meta = std::fs::metadata(output.label())
        .or_else(|_| std::fs::symlink_metadata(output.label()))
        .ok();
    if let Some(output_meta) = output_meta {
        if output_meta.dev() == target_meta.dev() && output_meta.ino() == target_meta.ino() {
            return Err(Error::Config(
                "cannot rename output file to itself".to_string(),
            ));
        }
        if output_meta.dev() != target_meta.dev() {
            return Err(Error::Config(format!(
                "rename target {} is on a different filesystem",
                rename_to.display()
            )));
        }
    }
    Ok(())
}

fn truncate(fd: RawFd, len: u64) -> std::io::Result<()> {
    let ret = unsafe { libc::ftruncate(fd, len as libc::off_t) };
    if ret == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn rename(from: &str, to: &Path) -> Result<()> {
    std::fs::rename(from, to).map_err(|source| Error::Rename {
        from: from.to_string(),
        to: to.display().to_string(),
        source,
    })
}
