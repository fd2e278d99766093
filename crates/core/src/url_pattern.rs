//! URL matching for navigation waits.

use std::fmt;

use regex::Regex;

use crate::error::{Error, Result};

/// A URL glob compiled to a regular expression.
///
/// Globs follow Playwright's rules: `**` matches any run of characters,
/// `*` matches within one path segment, `{a,b}` is an alternation, and
/// everything else (including `?`) is literal.
#[derive(Debug, Clone)]
pub struct UrlPattern {
	source: String,
	regex: Regex,
}

impl UrlPattern {
	pub fn glob(glob: &str) -> Result<Self> {
		let regex = Regex::new(&glob_to_regex(glob)).map_err(|e| Error::Configuration(format!("invalid URL glob '{glob}': {e}")))?;
		Ok(Self {
			source: glob.to_string(),
			regex,
		})
	}

	pub fn matches(&self, url: &str) -> bool {
		self.regex.is_match(url)
	}
}

impl fmt::Display for UrlPattern {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.source)
	}
}

fn glob_to_regex(glob: &str) -> String {
	let mut out = String::with_capacity(glob.len() * 2 + 2);
	out.push('^');
	let mut chars = glob.chars().peekable();
	let mut in_group = false;
	while let Some(c) = chars.next() {
		match c {
			'*' if chars.peek() == Some(&'*') => {
				chars.next();
				out.push_str(".*");
			}
			'*' => out.push_str("[^/]*"),
			'{' => {
				in_group = true;
				out.push('(');
			}
			'}' if in_group => {
				in_group = false;
				out.push(')');
			}
			',' if in_group => out.push('|'),
			'\\' => {
				if let Some(escaped) = chars.next() {
					out.push_str(&regex::escape(&escaped.to_string()));
				}
			}
			other => out.push_str(&regex::escape(&other.to_string())),
		}
	}
	out.push('$');
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn double_star_spans_segments() {
		let pattern = UrlPattern::glob("https://pass.proton.me/u/**").unwrap();
		assert!(pattern.matches("https://pass.proton.me/u/1"));
		assert!(pattern.matches("https://pass.proton.me/u/1/vault/abc?x=1"));
		assert!(!pattern.matches("https://account.proton.me/login"));
		assert!(!pattern.matches("https://pass.proton.me/reauth"));
	}

	#[test]
	fn single_star_stays_in_one_segment() {
		let pattern = UrlPattern::glob("https://example.com/*/items").unwrap();
		assert!(pattern.matches("https://example.com/a/items"));
		assert!(!pattern.matches("https://example.com/a/b/items"));
	}

	#[test]
	fn question_mark_and_dots_are_literal() {
		let pattern = UrlPattern::glob("https://example.com/page?x=1").unwrap();
		assert!(pattern.matches("https://example.com/page?x=1"));
		assert!(!pattern.matches("https://example.com/pageax=1"));
		assert!(!pattern.matches("https://exampleXcom/page?x=1"));
	}

	#[test]
	fn braces_alternate() {
		let pattern = UrlPattern::glob("https://{pass,account}.proton.me/**").unwrap();
		assert!(pattern.matches("https://pass.proton.me/u/1"));
		assert!(pattern.matches("https://account.proton.me/login"));
		assert!(!pattern.matches("https://mail.proton.me/u/1"));
	}

	#[test]
	fn source_glob_is_displayed() {
		assert_eq!(UrlPattern::glob("https://pass.proton.me/u/**").unwrap().to_string(), "https://pass.proton.me/u/**");
	}
}
