// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use regex::Regex;

/// Compile a shell-style glob into an anchored regex over `/`-separated
/// relative paths.
///
/// `*` and `?` never cross a `/`, `**` does, `[...]` is a character class and
/// `{a,b}` an alternation. Everything else matches literally.
///
/// # Example
///
/// ```rust
/// use phylowood::utils::glob_to_regex;
///
/// let re = glob_to_regex("*_mafft.fa").unwrap();
/// assert!(re.is_match("speciesA_mafft.fa"));
/// assert!(!re.is_match("nested/speciesA_mafft.fa"));
/// ```
pub fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut out = String::from("^");
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    let mut in_braces = false;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    out.push_str("(?:.*/)?");
                    i += 2;
                } else {
                    out.push_str(".*");
                    i += 1;
                }
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => match chars[i + 1..].iter().position(|&c| c == ']') {
                Some(len) => {
                    let class: String = chars[i + 1..i + 1 + len].iter().collect();
                    let class = class.strip_prefix('!').map(|s| format!("^{}", s)).unwrap_or(class);
                    out.push('[');
                    out.push_str(&class);
                    out.push(']');
                    i += len + 1;
                }
                None => out.push_str(r"\["),
            },
            '{' => {
                in_braces = true;
                out.push_str("(?:");
            }
            ',' if in_braces => out.push('|'),
            '}' if in_braces => {
                in_braces = false;
                out.push(')');
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
        i += 1;
    }
    out.push('$');
    Regex::new(&out)
}
