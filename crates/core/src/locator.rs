//! Element locators, rendered to Playwright's selector grammar.
//!
//! A locator is a chain of selector parts joined by ` >> `; each part narrows
//! the match set of the one before it.

use std::fmt;

/// How an accessible name or text is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMatch {
	/// Case-insensitive substring.
	Loose,
	/// Case-sensitive, whole string.
	Exact,
}

impl TextMatch {
	fn suffix(self) -> char {
		match self {
			Self::Loose => 'i',
			Self::Exact => 's',
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
	selector: String,
}

fn quoted(text: &str) -> String {
	serde_json::Value::from(text).to_string()
}

impl Locator {
	pub fn css(selector: impl Into<String>) -> Self {
		Self { selector: selector.into() }
	}

	/// Element whose `data-testid` equals `id`.
	pub fn test_id(id: &str) -> Self {
		Self::css(format!("internal:testid=[data-testid={}s]", quoted(id)))
	}

	/// Element with ARIA `role` whose accessible name contains `name`.
	pub fn role(role: &str, name: &str) -> Self {
		Self::role_matching(role, name, TextMatch::Loose)
	}

	pub fn role_matching(role: &str, name: &str, matching: TextMatch) -> Self {
		Self::css(format!("internal:role={role}[name={}{}]", quoted(name), matching.suffix()))
	}

	pub fn text(text: &str, matching: TextMatch) -> Self {
		Self::css(format!("internal:text={}{}", quoted(text), matching.suffix()))
	}

	/// Keeps matches whose whole text content is exactly `text`.
	pub fn with_exact_text(self, text: &str) -> Self {
		self.then(format!("internal:has-text=/^{}$/", regex::escape(text).replace('/', "\\/")))
	}

	/// The zero-based `index`-th match.
	pub fn nth(self, index: usize) -> Self {
		self.then(format!("nth={index}"))
	}

	pub fn first(self) -> Self {
		self.nth(0)
	}

	fn then(mut self, part: String) -> Self {
		self.selector.push_str(" >> ");
		self.selector.push_str(&part);
		self
	}

	pub fn selector(&self) -> &str {
		&self.selector
	}
}

impl fmt::Display for Locator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.selector)
	}
}
