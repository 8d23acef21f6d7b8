use std::fmt::Display;

use derive_more::Deref;
use derive_more::DerefMut;
use serde::Deserialize;
use serde::Serialize;

/// Ordered tag attributes as written in the source.
///
/// A valueless attribute (`<style disabled>`) is stored with `None`. Lookups
/// are ASCII case-insensitive, matching how browsers treat attribute names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref, DerefMut, Serialize, Deserialize)]
pub struct Attributes(
	#[deref]
	#[deref_mut]
	Vec<(String, Option<String>)>,
);

impl Attributes {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns `true` when the attribute is present, with or without a value.
	pub fn has(&self, name: &str) -> bool {
		self.0.iter().any(|(key, _)| key.eq_ignore_ascii_case(name))
	}

	/// The value of the first attribute called `name`. Valueless attributes
	/// return `None`.
	pub fn get(&self, name: &str) -> Option<&str> {
		self.0
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.and_then(|(_, value)| value.as_deref())
	}

	/// Like [`Attributes::get`] but ignores empty values.
	pub fn non_empty(&self, name: &str) -> Option<&str> {
		self.get(name).filter(|value| !value.is_empty())
	}

	pub fn insert(&mut self, name: impl Into<String>, value: Option<String>) {
		self.0.push((name.into(), value));
	}
}

impl<K, V> FromIterator<(K, V)> for Attributes
where
	K: Into<String>,
	V: Into<String>,
{
	fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
		Self(
			iter.into_iter()
				.map(|(key, value)| (key.into(), Some(value.into())))
				.collect(),
		)
	}
}

/// A tag reported by the lexer, e.g. `<script src="a.js">` or `</script>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagEvent {
	/// The tag name as written. Dispatch lower-cases it.
	pub name: String,
	/// Attributes of an opening tag. Always empty for closing tags.
	pub attrs: Attributes,
	/// The exact source text of the tag.
	pub source: String,
	/// `true` for `</name>`.
	pub closed: bool,
	/// `true` for `<name/>`.
	pub self_closed: bool,
}

impl TagEvent {
	/// Returns `true` when this tag can open a resource region.
	pub fn is_real_open(&self) -> bool {
		!self.closed && !self.self_closed
	}

	/// Returns `true` when this tag can close a resource region.
	pub fn is_real_close(&self) -> bool {
		self.closed && !self.self_closed
	}
}

impl Display for TagEvent {
	/// Serialise the tag back to markup from its parsed parts.
	///
	/// `{name:"div", attrs:{a:"1", hidden}}` becomes `<div a="1" hidden>`.
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if self.name.is_empty() {
			return Ok(());
		}

		write!(f, "<")?;
		if self.closed {
			write!(f, "/")?;
		}
		write!(f, "{}", self.name)?;

		if !self.closed {
			for (key, value) in self.attrs.iter() {
				match value.as_deref() {
					Some(value) if !value.is_empty() => write!(f, " {key}=\"{value}\"")?,
					_ => write!(f, " {key}")?,
				}
			}
			if self.self_closed {
				write!(f, "/")?;
			}
		}

		write!(f, ">")
	}
}

/// A run of text between tags and comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEvent {
	pub source: String,
	/// Set when the text is the raw source of a tag being passed through.
	pub name: Option<String>,
}

/// An html comment, e.g. `<!-- @STYLE {core:false} -->`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentEvent {
	/// The full comment including the delimiters.
	pub source: String,
	/// The text between `<!--` and `-->`.
	pub comment: String,
}

/// One lexical event, fed to the content state machine in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkupEvent {
	Tag(TagEvent),
	Text(TextEvent),
	Comment(CommentEvent),
}

impl MarkupEvent {
	/// The exact source text covered by this event.
	pub fn source(&self) -> &str {
		match self {
			Self::Tag(tag) => &tag.source,
			Self::Text(text) => &text.source,
			Self::Comment(comment) => &comment.source,
		}
	}
}

/// The output buffer of a parse: an ordered list of strings whose
/// concatenation is the serialised document.
///
/// Placeholders are ordinary entries (usually empty) whose index is recorded
/// so a later pipeline stage can overwrite them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref, DerefMut, Serialize, Deserialize)]
pub struct Buffer(
	#[deref]
	#[deref_mut]
	Vec<String>,
);

impl Buffer {
	pub fn new() -> Self {
		Self::default()
	}

	/// Append an entry and return its index.
	pub fn push_entry(&mut self, value: impl Into<String>) -> usize {
		self.0.push(value.into());
		self.0.len() - 1
	}

	/// Concatenate every entry.
	pub fn stringify(&self) -> String {
		self.0.concat()
	}
}
