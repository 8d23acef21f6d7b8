use logos::Logos;

use crate::tokens::Attributes;
use crate::tokens::CommentEvent;
use crate::tokens::MarkupEvent;
use crate::tokens::TagEvent;
use crate::tokens::TextEvent;

/// Elements whose body is raw text: everything up to the matching close tag
/// is reported as one text event.
const RAW_TEXT_ELEMENTS: [&str; 3] = ["style", "script", "textarea"];

/// Raw tokens produced by logos for the inside of an opening tag, i.e.
/// everything after the tag name.
#[derive(Logos, Debug, PartialEq)]
enum AttrToken {
	#[token(">")]
	TagEnd,
	#[token("/>")]
	SelfClosingEnd,
	#[token("=")]
	Equals,
	#[token("/")]
	Slash,
	#[regex(r"[ \t\r\n\x0C]+")]
	Whitespace,
	#[regex(r#""[^"]*""#)]
	DoubleQuotedString,
	#[regex(r"'[^']*'")]
	SingleQuotedString,
	#[regex(r#"[^ \t\r\n\x0C"'>/=]+"#)]
	Name,
}

/// Walks markup source and produces tag, text and comment events.
struct MarkupWalker<'a> {
	/// The full source being tokenized.
	source: &'a str,
	/// Byte offset of the next unread character.
	cursor: usize,
	/// Byte offset where the current text run began.
	text_start: usize,
	/// Collected events.
	events: Vec<MarkupEvent>,
}

impl<'a> MarkupWalker<'a> {
	fn new(source: &'a str) -> Self {
		Self {
			source,
			cursor: 0,
			text_start: 0,
			events: vec![],
		}
	}

	/// Emit the pending text run ending at `end`, if any.
	fn flush_text(&mut self, end: usize) {
		if end > self.text_start {
			self.events.push(MarkupEvent::Text(TextEvent {
				source: self.source[self.text_start..end].to_string(),
				name: None,
			}));
		}
		self.text_start = end;
	}

	/// Record an event that starts at `start` and covers `len` bytes.
	fn push_event(&mut self, start: usize, len: usize, event: MarkupEvent) {
		self.flush_text(start);
		self.events.push(event);
		self.cursor = start + len;
		self.text_start = self.cursor;
	}

	/// Main processing loop.
	fn process(&mut self) {
		while let Some(offset) = self.source[self.cursor..].find('<') {
			let start = self.cursor + offset;
			let rest = &self.source[start..];

			if let Some(body) = rest.strip_prefix("<!--") {
				// An unterminated comment swallows the rest of the input as text.
				let Some(end) = body.find("-->") else {
					break;
				};
				let len = 4 + end + 3;
				let event = MarkupEvent::Comment(CommentEvent {
					source: rest[..len].to_string(),
					comment: body[..end].to_string(),
				});
				self.push_event(start, len, event);
				continue;
			}

			let Some((tag, len)) = lex_tag(rest) else {
				self.cursor = start + 1;
				continue;
			};

			let raw_text = tag.is_real_open()
				&& RAW_TEXT_ELEMENTS
					.iter()
					.any(|name| tag.name.eq_ignore_ascii_case(name));
			let name = tag.name.clone();
			self.push_event(start, len, MarkupEvent::Tag(tag));

			if raw_text {
				self.skip_raw_text(&name);
			}
		}

		self.flush_text(self.source.len());
	}

	/// Advance past the body of a raw text element so that the next lexed
	/// token is its closing tag.
	fn skip_raw_text(&mut self, name: &str) {
		let rest = &self.source[self.cursor..];
		let end = find_closing_tag(rest, name).unwrap_or(rest.len());
		self.cursor += end;
		self.flush_text(self.cursor);
	}
}

/// Lex a tag at the start of `rest`. Returns the tag and the number of bytes
/// it covers, or `None` when `rest` does not start with a well-formed tag.
fn lex_tag(rest: &str) -> Option<(TagEvent, usize)> {
	let bytes = rest.as_bytes();

	if bytes.get(1) == Some(&b'/') {
		let name_len = tag_name_len(&rest[2..])?;
		let name = &rest[2..2 + name_len];
		let close = rest[2 + name_len..].find('>')?;
		let len = 2 + name_len + close + 1;

		return Some((
			TagEvent {
				name: name.to_string(),
				attrs: Attributes::new(),
				source: rest[..len].to_string(),
				closed: true,
				self_closed: false,
			},
			len,
		));
	}

	let name_len = tag_name_len(&rest[1..])?;
	let name = &rest[1..=name_len];
	let (attrs, consumed, self_closed) = lex_attributes(&rest[1 + name_len..])?;
	let len = 1 + name_len + consumed;

	Some((
		TagEvent {
			name: name.to_string(),
			attrs,
			source: rest[..len].to_string(),
			closed: false,
			self_closed,
		},
		len,
	))
}

/// Length of the tag name at the start of `text`. Tag names start with an
/// ascii letter.
fn tag_name_len(text: &str) -> Option<usize> {
	if !text.as_bytes().first()?.is_ascii_alphabetic() {
		return None;
	}

	Some(
		text.bytes()
			.position(|byte| !is_tag_name_byte(byte))
			.unwrap_or(text.len()),
	)
}

fn is_tag_name_byte(byte: u8) -> bool {
	byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b':' | b'.')
}

fn is_html_space(ch: char) -> bool {
	matches!(ch, ' ' | '\t' | '\r' | '\n' | '\x0C')
}

/// Lex the attributes of an opening tag up to and including `>` or `/>`.
///
/// Returns the attributes, the number of bytes consumed, and whether the tag
/// was self-closing. Returns `None` when the tag never ends.
fn lex_attributes(text: &str) -> Option<(Attributes, usize, bool)> {
	let mut lexer = AttrToken::lexer(text);
	let mut attrs = Attributes::new();
	let mut pending: Option<String> = None;

	while let Some(result) = lexer.next() {
		match result {
			Ok(AttrToken::TagEnd | AttrToken::SelfClosingEnd) => {
				if let Some(name) = pending.take() {
					attrs.insert(name, None);
				}
				let self_closed = lexer.slice() == "/>";
				return Some((attrs, lexer.span().end, self_closed));
			}
			Ok(AttrToken::Name) => {
				if let Some(name) = pending.replace(lexer.slice().to_string()) {
					attrs.insert(name, None);
				}
			}
			Ok(AttrToken::Equals) => {
				let name = pending.take().unwrap_or_default();
				let remainder = lexer.remainder();
				let trimmed = remainder.trim_start_matches(is_html_space);
				let skipped = remainder.len() - trimmed.len();

				let (value, used) = match trimmed.as_bytes().first() {
					Some(&quote @ (b'"' | b'\'')) => {
						let end = trimmed[1..].find(quote as char)?;
						(trimmed[1..=end].to_string(), end + 2)
					}
					_ => {
						let end = trimmed
							.find(|ch: char| is_html_space(ch) || ch == '>')
							.unwrap_or(trimmed.len());
						(trimmed[..end].to_string(), end)
					}
				};

				lexer.bump(skipped + used);
				attrs.insert(name, Some(value));
			}
			// Stray quotes, slashes and unknown bytes carry no attribute.
			Ok(
				AttrToken::Whitespace
				| AttrToken::Slash
				| AttrToken::DoubleQuotedString
				| AttrToken::SingleQuotedString,
			)
			| Err(()) => {}
		}
	}

	None
}

/// Tokenize markup into the ordered event stream consumed by the content
/// state machine. Concatenating every event's source reproduces `content`.
pub fn tokenize(content: &str) -> Vec<MarkupEvent> {
	let mut walker = MarkupWalker::new(content);
	walker.process();
	walker.events
}

/// Byte offset of the first `</name` in `haystack` that is followed by a
/// character that cannot continue a tag name. The name match is ascii case
/// insensitive.
pub(crate) fn find_closing_tag(haystack: &str, name: &str) -> Option<usize> {
	let needle = format!("</{name}");
	let mut from = 0;

	while let Some(offset) = find_ignore_ascii_case(&haystack[from..], &needle) {
		let start = from + offset;
		let after = haystack.as_bytes().get(start + needle.len());
		if after.is_none_or(|byte| !is_tag_name_byte(*byte)) {
			return Some(start);
		}
		from = start + 1;
	}

	None
}

/// Ascii case-insensitive substring search.
pub(crate) fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
	let needle = needle.as_bytes();
	if needle.is_empty() {
		return Some(0);
	}

	haystack
		.as_bytes()
		.windows(needle.len())
		.position(|window| window.eq_ignore_ascii_case(needle))
}
