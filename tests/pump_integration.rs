//! End-to-end scenarios driving the real `ow` binary against real
//! coprocesses, covering the same-file in-place transform boundary
//! cases: empty input, single byte, length-preserving transform,
//! shrinking transform (truncation), coprocess failure, and the
//! distinct-file fast path.

mod support;

use support::{read, run_ow, scratch_file};

#[test]
fn empty_input_same_file_stays_empty() {
    let f = scratch_file(b"");
    let path = f.path().to_str().unwrap();
    let out = run_ow(&["-f", path, "--", "cat"]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(read(f.path()), b"");
}

#[test]
fn single_byte_identity_same_file() {
    let f = scratch_file(b"x");
    let path = f.path().to_str().unwrap();
    let out = run_ow(&["-f", path, "--", "cat"]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(read(f.path()), b"x");
}

#[test]
fn length_preserving_transform_same_file() {
    let f = scratch_file(b"hello world");
    let path = f.path().to_str().unwrap();
    let out = run_ow(&["-f", path, "--", "tr", "a-z", "A-Z"]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(read(f.path()), b"HELLO WORLD");
}

#[test]
fn shrinking_transform_same_file_truncates() {
    let f = scratch_file(b"aaaaaaaaaa");
    let path = f.path().to_str().unwrap();
    // tr -d deletes every 'a', shrinking a 10-byte file to 0 bytes.
    let out = run_ow(&["-f", path, "--", "tr", "-d", "a"]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let result = read(f.path());
    assert_eq!(result, b"");
    assert_eq!(std::fs::metadata(f.path()).unwrap().len(), 0);
}

#[test]
fn shrinking_transform_same_file_truncates_to_nonempty_result() {
    let f = scratch_file(b"aaaabbbb");
    let path = f.path().to_str().unwrap();
    // tr -d deletes every 'a', shrinking the 8-byte file to the 4-byte
    // tail "bbbb" rather than to empty, exercising the trailing-garbage
    // truncation itself rather than the degenerate all-deleted case above.
    let out = run_ow(&["-f", path, "--", "tr", "-d", "a"]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let result = read(f.path());
    assert_eq!(result, b"bbbb");
    assert_eq!(std::fs::metadata(f.path()).unwrap().len(), 4);
}

#[test]
fn coprocess_failure_leaves_original_untouched() {
    let f = scratch_file(b"untouched contents");
    let path = f.path().to_str().unwrap();
    // Drains stdin fully (so the pump never sees a write error) but
    // writes nothing back before failing.
    let out = run_ow(&["-f", path, "--", "sh", "-c", "cat >/dev/null; exit 7"]);
    assert!(!out.status.success());
    assert_eq!(out.status.code(), Some(7));
    assert_eq!(read(f.path()), b"untouched contents");
}

#[test]
fn distinct_files_exec_replace_runs_transform() {
    let input = scratch_file(b"abc");
    let output = tempfile::NamedTempFile::new().unwrap();
    let out = run_ow(&[
        "-i",
        input.path().to_str().unwrap(),
        "-o",
        output.path().to_str().unwrap(),
        "--",
        "tr",
        "a-z",
        "A-Z",
    ]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(read(output.path()), b"ABC");
}

#[test]
fn append_mode_appends_transformed_copy_of_original() {
    let f = scratch_file(b"base\n");
    let path = f.path().to_str().unwrap();
    // Same-file append mode reads the file's original bytes (capped at
    // its size at pump entry) and appends the transformed copy after them.
    let out = run_ow(&["-f", path, "-a", "--", "tr", "a-z", "A-Z"]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(read(f.path()), b"base\nBASE\n");
}

#[test]
fn redirect_tokens_are_equivalent_to_flags() {
    let input = scratch_file(b"redirect me");
    let output = tempfile::NamedTempFile::new().unwrap();
    let redirect_in = format!("<{}", input.path().to_str().unwrap());
    let redirect_out = format!(">{}", output.path().to_str().unwrap());
    let out = run_ow(&[&redirect_in, &redirect_out, "--", "cat"]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(read(output.path()), b"redirect me");
}
