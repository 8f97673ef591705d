//! Escaping of distinguished names and search filters, and the user DN
//! template used by template-bind authentication.
//!
//! DN escaping follows RFC 4514: the characters `, + " \ < > ; =` are
//! escaped with a backslash, as are leading `#` and leading or trailing
//! spaces. NUL is hex-escaped. Filter escaping follows RFC 4515 and is a
//! different rule set; the two must not be mixed up.

use crate::error::Error;

/// The substitution placeholder recognized in DN templates and group
/// search filters.
pub const PLACEHOLDER: &str = "{0}";

/// Characters that must always be backslash-escaped in a DN attribute
/// value.
const DN_SPECIALS: &[char] = &[',', '+', '"', '\\', '<', '>', ';', '='];

/// Escape a single attribute value for embedding in a distinguished name.
#[must_use]
pub fn escape_dn_value(value: &str) -> String {
	let mut escaped = String::with_capacity(value.len());
	let last = value.chars().count().saturating_sub(1);
	for (i, c) in value.chars().enumerate() {
		match c {
			'\0' => escaped.push_str("\\00"),
			' ' if i == 0 || i == last => {
				escaped.push('\\');
				escaped.push(' ');
			}
			'#' if i == 0 => {
				escaped.push('\\');
				escaped.push('#');
			}
			c if DN_SPECIALS.contains(&c) => {
				escaped.push('\\');
				escaped.push(c);
			}
			c => escaped.push(c),
		}
	}
	escaped
}

/// Reverse [`escape_dn_value`]. Handles both backslash-character escapes
/// and two-digit hex escapes. Returns `None` if an escape sequence is
/// malformed.
#[must_use]
pub fn unescape_dn_value(value: &str) -> Option<String> {
	let mut unescaped = String::with_capacity(value.len());
	let mut chars = value.chars();
	while let Some(c) = chars.next() {
		if c != '\\' {
			unescaped.push(c);
			continue;
		}
		let next = chars.next()?;
		if next.is_ascii_hexdigit() {
			let second = chars.next()?;
			let pair = [next, second].iter().collect::<String>();
			let byte = u8::from_str_radix(&pair, 16).ok()?;
			unescaped.push(char::from(byte));
		} else {
			unescaped.push(next);
		}
	}
	Some(unescaped)
}

/// Escape a value for embedding in a search filter, per RFC 4515.
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
	let mut escaped = String::with_capacity(value.len());
	for c in value.chars() {
		match c {
			'*' => escaped.push_str("\\2a"),
			'(' => escaped.push_str("\\28"),
			')' => escaped.push_str("\\29"),
			'\\' => escaped.push_str("\\5c"),
			'\0' => escaped.push_str("\\00"),
			c => escaped.push(c),
		}
	}
	escaped
}

/// Substitute the `{0}` placeholder in a search filter with an escaped
/// value.
#[must_use]
pub fn render_filter(filter: &str, value: &str) -> String {
	filter.replace(PLACEHOLDER, &escape_filter_value(value))
}

/// A DN pattern with a single `{0}` placeholder for the username, e.g.
/// `uid={0},ou=people,dc=example,dc=org`.
#[derive(Clone, Debug)]
pub struct DnTemplate(String);

impl DnTemplate {
	/// Validate a template string. The template must contain exactly one
	/// placeholder.
	pub fn new(template: &str) -> Result<Self, Error> {
		match template.matches(PLACEHOLDER).count() {
			1 => Ok(DnTemplate(template.to_owned())),
			n => Err(Error::Configuration(format!(
				"user DN template {template:?} must contain exactly one {PLACEHOLDER} placeholder, found {n}"
			))),
		}
	}

	/// Render the template with the given username, escaping DN-special
	/// characters in it.
	#[must_use]
	pub fn render(&self, username: &str) -> String {
		self.0.replace(PLACEHOLDER, &escape_dn_value(username))
	}
}
