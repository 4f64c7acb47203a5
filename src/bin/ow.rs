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

use std::ffi::CString;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::info;

use ow::child::Child;
use ow::cli::Cli;
use ow::config::Config;
use ow::endpoint::{Endpoint, EndpointKind};
use ow::error::{Error, Result};
use ow::finalize;
use ow::mode::Mode;
use ow::pump::Pump;
use ow::redirect;

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            eprintln!("ow: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<i32> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let raw: Vec<String> = std::env::args().collect();
    let (passthrough, redirects) = redirect::extract(&raw[1..])?;

    let mut argv = Vec::with_capacity(passthrough.len() + 1);
    argv.push(raw[0].clone());
    argv.extend(passthrough);
    let cli = Cli::parse_from(argv);

    let (cli_input, cli_output) = if let Some(inout) = cli.inout {
        (Some(inout.clone()), Some(inout))
    } else {
        (cli.input, cli.output)
    };

    let input_path = merge("input", cli_input, redirects.input)?;
    let output_path = merge("output", cli_output, redirects.output)?;
    let append = cli.append || redirects.append;

    let input = open_input(input_path.as_deref(), cli.punchhole)?;
    let output = open_output(output_path.as_deref(), append)?;

    if let Some(rename_to) = &cli.rename {
        finalize::validate_rename(&output, rename_to)?;
    }

    let config = Config::derive(&input, &output, append, cli.punchhole, cli.rename.clone());
    let has_command = !cli.command.is_empty();
    let mode = ow::mode::select(&config, &input, &output, has_command);

    info!("ow: mode={:?} overwrite={} append={}", mode, config.overwrite, config.append);

    match mode {
        Mode::PassThrough => {
            use std::os::unix::process::ExitStatusExt;
            // Mirrors ow.c's no-command branch: with no coprocess to feed
            // through a read-ahead-gated pump, a regular non-append output
            // is truncated up front instead of via the post-transfer
            // ftruncate finalize::commit otherwise performs.
            if !config.append
                && !config.punchhole
                && config.rename_to.is_none()
                && output.kind() == EndpointKind::Regular
            {
                truncate_to_zero(&output)?;
            }
            let cap = cap_for(&config);
            let n = ow::bulk::select_and_run(&input, &output, config.append, cap)?;
            finalize::commit(n, std::process::ExitStatus::from_raw(0), &config, &output)
        }
        Mode::ExecReplace => exec_replace(&cli.command, &input, &output),
        Mode::Pump => {
            let mut child = Child::spawn(&cli.command)?;
            let outcome = {
                let mut pump = Pump::new(
                    &input,
                    &output,
                    &mut child.stdin_write,
                    &child.stdout_read,
                    &config,
                );
                pump.run()?
            };
            let status = child.wait()?;
            finalize::commit(outcome.opos, status, &config, &output)
        }
    }
}

fn cap_for(config: &Config) -> u64 {
    config.input_original_size.unwrap_or(u64::MAX)
}

fn merge(field: &str, flag: Option<PathBuf>, redirect: Option<PathBuf>) -> Result<Option<PathBuf>> {
    match (flag, redirect) {
        (Some(_), Some(_)) => Err(Error::Config(format!(
            "cannot set {} twice (flag and redirect both given)",
            field
        ))),
        (Some(p), None) | (None, Some(p)) => Ok(Some(p)),
        (None, None) => Ok(None),
    }
}

fn open_input(path: Option<&Path>, punchhole: bool) -> Result<Endpoint> {
    // fallocate(FALLOC_FL_PUNCH_HOLE) requires a writable descriptor.
    let flags = if punchhole { libc::O_RDWR } else { libc::O_RDONLY };
    match path {
        Some(p) => {
            let fd = raw_open(p, flags, 0)?;
            Endpoint::from_fd(fd, p.display().to_string())
        }
        None => Endpoint::from_fd(libc::STDIN_FILENO, "<stdin>"),
    }
}

fn open_output(path: Option<&Path>, append: bool) -> Result<Endpoint> {
    // No O_TRUNC here: in the overwrite case (same inode as the input)
    // truncating at open time would wipe the file before the pump ever
    // reads it. Shrinking the file is handled afterwards, either by the
    // upfront truncate in the no-command pass-through case or by
    // finalize::commit's post-transfer ftruncate(opos).
    match path {
        Some(p) => {
            let flags = libc::O_WRONLY | libc::O_CREAT | if append { libc::O_APPEND } else { 0 };
            let fd = raw_open(p, flags, 0o644)?;
            Endpoint::from_fd(fd, p.display().to_string())
        }
        None => Endpoint::from_fd(libc::STDOUT_FILENO, "<stdout>"),
    }
}

fn truncate_to_zero(output: &Endpoint) -> Result<()> {
    let rc = unsafe { libc::ftruncate(output.fd(), 0) };
    if rc == -1 {
        return Err(Error::IoAt {
            op: "ftruncate",
            path: output.label().to_string(),
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

fn raw_open(path: &Path, flags: libc::c_int, mode: libc::mode_t) -> Result<RawFd> {
    let c_path = CString::new(path.as_os_str().to_string_lossy().as_bytes())
        .map_err(|_| Error::Config(format!("invalid path {:?}", path)))?;
    let fd = unsafe { libc::open(c_path.as_ptr(), flags, mode) };
    if fd == -1 {
        return Err(Error::IoAt {
            op: "open",
            path: path.display().to_string(),
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(fd)
}

/// Execs the coprocess directly with the two endpoints wired to its
/// stdin/stdout, bypassing the scheduler entirely. Never returns on success.
fn exec_replace(command: &[String], input: &Endpoint, output: &Endpoint) -> Result<i32> {
    unsafe {
        libc::dup2(input.fd(), libc::STDIN_FILENO);
        libc::dup2(output.fd(), libc::STDOUT_FILENO);
    }
    let cstrings: Vec<CString> = command
        .iter()
        .map(|s| CString::new(s.as_str()).unwrap())
        .collect();
    let mut c_argv: Vec<*const libc::c_char> = cstrings.iter().map(|c| c.as_ptr()).collect();
    c_argv.push(std::ptr::null());

    unsafe {
        libc::execvp(c_argv[0], c_argv.as_ptr());
    }
    let err = std::io::Error::last_os_error();
    Err(Error::IoAt {
        op: "execvp",
        path: command[0].clone(),
        source: err,
    })
}
