// SPDX-FileCopyrightText: Copyright © 2020-2026 Depot Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Glob-to-anchored-pattern compilation, implemented directly against
//! [`regex::Regex`] rather than a hand-rolled tokenizer: the compiled
//! form here is a plain substring match rather than a named-group
//! matcher.

use regex::Regex;

/// A compiled wildcard pattern.
///
/// `*` matches one or more characters; with a non-empty `sep`, it
/// cannot match any character in `sep`. The match is a substring match:
/// callers anchor the match themselves via their own pattern syntax
/// (e.g. `name@*` vs `name@repo-*`).
#[derive(Debug, Clone)]
pub struct Pattern {
    regex: Regex,
}

impl Pattern {
    /// Compile `pattern`, treating each byte in `sep` as a separator
    /// character `*` must not cross.
    pub fn compile(pattern: &str, sep: &str) -> Self {
        let mut buf = String::with_capacity(pattern.len() * 2);

        for ch in pattern.chars() {
            if ch == '*' {
                if sep.is_empty() {
                    buf.push_str(".+");
                } else {
                    buf.push_str("[^");
                    for sep_ch in sep.chars() {
                        buf.push_str(&regex::escape(&sep_ch.to_string()));
                    }
                    buf.push_str("]+");
                }
            } else {
                buf.push_str(&regex::escape(&ch.to_string()));
            }
        }

        // Compilation failure here would mean our own escaping is
        // broken, not a caller error, so unwrap is appropriate.
        let regex = Regex::new(&buf).expect("wildcard pattern compiles to valid regex");

        Self { regex }
    }

    /// True iff the pattern matches anywhere within `s`.
    pub fn matches(&self, s: &str) -> bool {
        self.regex.is_match(s)
    }
}
