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

//! Shell-style redirect parsing: `<file`, `>file`, `>>file`, `<>file`,
//! `<>>file`, each either as one token or as a marker token followed by
//! a bare filename token. A leading `\<`/`\>` (or `\\<`/`\\>`) is an
//! escape that yields a literal argument instead of a redirect.
//!
//! Grounded in `ow.c`'s `parse_redirect`, translated from its in-place
//! `argv` rewrite into a pass over owned `String`s.

use std::path::PathBuf;

use crate::error::{Error, Result};

/// One parsed redirect token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    In(PathBuf),
    Out(PathBuf),
    OutAppend(PathBuf),
    InOut(PathBuf),
    InOutAppend(PathBuf),
}

/// The folded result of scanning a whole argument list for redirects.
#[derive(Debug, Clone, Default)]
pub struct RedirectSet {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub append: bool,
}

impl RedirectSet {
    fn apply(&mut self, r: Redirect) -> Result<()> {
        match r {
            Redirect::In(p) => self.set_input(p),
            Redirect::Out(p) => self.set_output(p, false),
            Redirect::OutAppend(p) => self.set_output(p, true),
            Redirect::InOut(p) => {
                self.set_input(p.clone())?;
                self.set_output(p, false)
            }
            Redirect::InOutAppend(p) => {
                self.set_input(p.clone())?;
                self.set_output(p, true)
            }
        }
    }

    fn set_input(&mut self, p: PathBuf) -> Result<()> {
        if self.input.is_some() {
            return Err(Error::Config("cannot set input file twice or more".to_string()));
        }
        self.input = Some(p);
        Ok(())
    }

    fn set_output(&mut self, p: PathBuf, append: bool) -> Result<()> {
        if self.output.is_some() {
            return Err(Error::Config("cannot set output file twice or more".to_string()));
        }
        self.output = Some(p);
        self.append = append;
        Ok(())
    }
}

/// Scans `args` for redirect tokens, folding them into a `RedirectSet`
/// and returning the remaining tokens (the coprocess argv) in order.
pub fn extract(args: &[String]) -> Result<(Vec<String>, RedirectSet)> {
    let mut passthrough = Vec::with_capacity(args.len());
    let mut set = RedirectSet::default();

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];

        if let Some(unescaped) = unescape_literal(arg) {
            passthrough.push(unescaped);
            i += 1;
            continue;
        }

        match parse_marker(arg) {
            Some((redirect_kind, rest)) => {
                let file = if rest.trim_start().is_empty() {
                    i += 1;
                    if i >= args.len() {
                        return Err(Error::Config(format!(
                            "no file specified for redirect in {:?}",
                            arg
                        )));
                    }
                    args[i].clone()
                } else {
                    rest.trim_start().to_string()
                };
                set.apply(redirect_kind(PathBuf::from(file)))?;
                i += 1;
            }
            None => {
                passthrough.push(arg.clone());
                i += 1;
            }
        }
    }

    Ok((passthrough, set))
}

/// If `arg` is an escaped literal (`\<...`, `\>...`, `\\<...`, `\\>...`),
/// returns the token with exactly one leading backslash removed.
fn unescape_literal(arg: &str) -> Option<String> {
    let mut chars = arg.chars();
    if chars.next() != Some('\\') {
        return None;
    }
    match chars.next() {
        Some('<') | Some('>') => Some(arg[1..].to_string()),
        Some('\\') => match chars.next() {
            Some('<') | Some('>') => Some(arg[1..].to_string()),
            _ => None,
        },
        _ => None,
    }
}

type RedirectCtor = fn(PathBuf) -> Redirect;

/// Recognizes a leading `<`, `>`, `>>`, `<>`, or `<>>` marker at the
/// start of `arg`, returning the redirect constructor to apply and the
/// remainder of the token after the marker.
fn parse_marker(arg: &str) -> Option<(RedirectCtor, &str)> {
    let bytes = arg.as_bytes();
    if bytes.is_empty() {
        return None;
    }

    let mut idx = 0;
    let has_in = bytes[idx] == b'<';
    if has_in {
        idx += 1;
    }
    let has_out = bytes.get(idx) == Some(&b'>');
    if has_out {
        idx += 1;
    }
    let has_append = has_out && bytes.get(idx) == Some(&b'>');
    if has_append {
        idx += 1;
    }

    if !has_in && !has_out {
        return None;
    }

    let rest = &arg[idx..];
    let ctor: RedirectCtor = match (has_in, has_out, has_append) {
        (true, false, _) => |p| Redirect::In(p),
        (false, true, false) => |p| Redirect::Out(p),
        (false, true, true) => |p| Redirect::OutAppend(p),
        (true, true, false) => |p| Redirect::InOut(p),
        (true, true, true) => |p| Redirect::InOutAppend(p),
        (false, false, _) => unreachable!(),
    };
    Some((ctor, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn plain_in_and_out_same_token() {
        let (cmd, set) = extract(&args(&["<in.txt", "cat", ">out.txt"])).unwrap();
        assert_eq!(cmd, vec!["cat".to_string()]);
        assert_eq!(set.input, Some(PathBuf::from("in.txt")));
        assert_eq!(set.output, Some(PathBuf::from("out.txt")));
        assert!(!set.append);
    }

    #[test]
    fn append_marker_sets_append_flag() {
        let (_cmd, set) = extract(&args(&["cat", ">>out.txt"])).unwrap();
        assert_eq!(set.output, Some(PathBuf::from("out.txt")));
        assert!(set.append);
    }

    #[test]
    fn inout_marker_sets_both_from_one_token() {
        let (_cmd, set) = extract(&args(&["<>both.txt", "tr", "a-z", "A-Z"])).unwrap();
        assert_eq!(set.input, Some(PathBuf::from("both.txt")));
        assert_eq!(set.output, Some(PathBuf::from("both.txt")));
        assert!(!set.append);
    }

    #[test]
    fn inout_append_marker() {
        let (_cmd, set) = extract(&args(&["<>>both.txt", "gzip"])).unwrap();
        assert_eq!(set.input, Some(PathBuf::from("both.txt")));
        assert_eq!(set.output, Some(PathBuf::from("both.txt")));
        assert!(set.append);
    }

    #[test]
    fn marker_and_filename_as_separate_tokens() {
        let (cmd, set) = extract(&args(&["<", "in.txt", "cat"])).unwrap();
        assert_eq!(cmd, vec!["cat".to_string()]);
        assert_eq!(set.input, Some(PathBuf::from("in.txt")));
    }

    #[test]
    fn escaped_leading_angle_bracket_is_literal() {
        let (cmd, set) = extract(&args(&["grep", "\\<pattern"])).unwrap();
        assert_eq!(cmd, vec!["grep".to_string(), "<pattern".to_string()]);
        assert!(set.input.is_none());
    }

    #[test]
    fn setting_input_twice_is_an_error() {
        let result = extract(&args(&["<a.txt", "cat", "<b.txt"]));
        assert!(result.is_err());
    }

    #[test]
    fn missing_filename_after_bare_marker_is_an_error() {
        let result = extract(&args(&["cat", "<"]));
        assert!(result.is_err());
    }
}
