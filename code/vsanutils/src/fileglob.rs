/// Matcher for trace file names.
///
/// The grammar is a small subset of shell globbing, applied to the final path component only:
///
///   <pattern> ::= <element>*
///   <element> ::= "*"                       -- any run of characters, possibly empty
///               | "?"                       -- exactly one character
///               | "{" <alt> ("," <alt>)* "}" -- one of the literal alternatives
///               | <literal char>
///
/// There is no nesting of braces and no escape syntax; the characters `{`, `}` and `,` cannot
/// appear literally inside an alternative.

use anyhow::{bail, Result};
use regex::Regex;

/// A `FileGlobber` is a matcher of patterns against file names.
///
/// The matcher holds a number of patterns, added with `insert`.  The `match_filename` method
/// attempts to match its argument against the patterns in the matcher, returning true if any of
/// them match.

pub struct FileGlobber {
    // Matcher + source pattern, for posterity.
    matchers: Vec<(Regex, String)>,
}

impl FileGlobber {
    /// Create a new, empty filter.

    pub fn new() -> FileGlobber {
        FileGlobber { matchers: vec![] }
    }

    /// Add the pattern to the set of patterns in the matcher.

    pub fn insert(&mut self, pattern: &str) -> Result<()> {
        self.matchers.push(compile_globber(pattern)?);
        Ok(())
    }

    /// Return true iff the filter has no patterns.

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// Match s against the patterns and return true iff it matches at least one pattern.

    pub fn match_filename(&self, s: &str) -> bool {
        self.matchers.iter().any(|m| m.0.is_match(s))
    }

    /// The source patterns, in insertion order.

    pub fn patterns(&self) -> Vec<&str> {
        self.matchers.iter().map(|m| m.1.as_str()).collect()
    }
}

impl Default for FileGlobber {
    fn default() -> Self {
        Self::new()
    }
}

fn compile_globber(p: &str) -> Result<(Regex, String)> {
    let cs = p.chars().collect::<Vec<char>>();
    let mut i = 0usize;
    let mut r = "^".to_string();
    while i < cs.len() {
        match cs[i] {
            '*' => {
                i += 1;
                r += "[^/]*";
            }
            '?' => {
                i += 1;
                r += "[^/]";
            }
            '{' => {
                i += 1;
                let mut alts = vec![];
                let mut alt = String::new();
                loop {
                    if i >= cs.len() {
                        bail!("Unterminated '{{' in file pattern");
                    }
                    match cs[i] {
                        '}' => {
                            alts.push(regex::escape(&alt));
                            i += 1;
                            break;
                        }
                        ',' => {
                            alts.push(regex::escape(&alt));
                            alt.clear();
                        }
                        '{' | '*' | '?' | '/' => {
                            bail!("Unexpected '{}' inside '{{...}}'", cs[i]);
                        }
                        c => alt.push(c),
                    }
                    i += 1;
                }
                r += "(?:";
                r += &alts.join("|");
                r += ")";
            }
            '}' | '/' => {
                bail!("Unexpected '{}' in file pattern", cs[i]);
            }
            c => {
                r += &regex::escape(&c.to_string());
                i += 1;
            }
        }
    }
    r += "$";
    Ok((Regex::new(&r)?, p.to_string()))
}

#[test]
fn test_fileglob_basic() {
    let mut g = FileGlobber::new();
    assert!(g.is_empty());
    g.insert("vsantraces--*.{txt,log}").unwrap();
    assert!(!g.is_empty());
    assert!(g.match_filename("vsantraces--2019-05-06T10h11m12s345.txt"));
    assert!(g.match_filename("vsantraces--.log"));
    assert!(!g.match_filename("vsantraces--a.gz"));
    assert!(!g.match_filename("vsantracesUrgent--a.txt"));
    assert!(!g.match_filename("xvsantraces--a.txt"));
    assert!(!g.match_filename("vsantraces--a.txt.gz"));
}

#[test]
fn test_fileglob_literal_dots_and_question() {
    let mut g = FileGlobber::new();
    g.insert("a?.txt").unwrap();
    assert!(g.match_filename("ab.txt"));
    assert!(!g.match_filename("abxtxt"));
    assert!(!g.match_filename("a.txt"));
}

#[test]
fn test_fileglob_multiple_patterns() {
    let mut g = FileGlobber::new();
    g.insert("x*.txt").unwrap();
    g.insert("y*.log").unwrap();
    assert!(g.patterns() == vec!["x*.txt", "y*.log"]);
    assert!(g.match_filename("x1.txt"));
    assert!(g.match_filename("y1.log"));
    assert!(!g.match_filename("x1.log"));
}

#[test]
fn test_fileglob_syntax_errors() {
    let mut g = FileGlobber::new();
    assert!(g.insert("a{txt").is_err());
    assert!(g.insert("a}").is_err());
    assert!(g.insert("a{b{c}}").is_err());
    assert!(g.insert("dir/a").is_err());
}
