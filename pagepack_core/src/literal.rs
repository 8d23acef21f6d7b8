//! A sandboxed parser for the object literals carried by build directives.
//!
//! Accepts a permissive superset of JSON: bare identifier keys, single quoted
//! strings, trailing commas and the `undefined` keyword. Nothing is ever
//! evaluated; anything outside the grammar is rejected with `None`.

use logos::Logos;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;
use snailquote::unescape;

/// Nesting depth beyond which a literal is rejected.
const MAX_DEPTH: usize = 64;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\x0C]+")]
enum LiteralToken {
	#[token("{")]
	BraceOpen,
	#[token("}")]
	BraceClose,
	#[token("[")]
	BracketOpen,
	#[token("]")]
	BracketClose,
	#[token(":")]
	Colon,
	#[token(",")]
	Comma,
	#[regex(r#""([^"\\]|\\.)*""#)]
	DoubleQuotedString,
	#[regex(r"'([^'\\]|\\.)*'")]
	SingleQuotedString,
	#[regex(r"-?[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?")]
	Number,
	#[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*")]
	Ident,
}

struct LiteralParser<'a> {
	tokens: Vec<(LiteralToken, &'a str)>,
	cursor: usize,
}

impl<'a> LiteralParser<'a> {
	fn new(source: &'a str) -> Option<Self> {
		let mut tokens = vec![];
		let mut lexer = LiteralToken::lexer(source);

		while let Some(result) = lexer.next() {
			tokens.push((result.ok()?, lexer.slice()));
		}

		Some(Self { tokens, cursor: 0 })
	}

	fn peek(&self) -> Option<LiteralToken> {
		self.tokens.get(self.cursor).map(|(token, _)| *token)
	}

	fn advance(&mut self) -> Option<(LiteralToken, &'a str)> {
		let token = self.tokens.get(self.cursor).copied();
		self.cursor += 1;
		token
	}

	fn expect(&mut self, expected: LiteralToken) -> Option<()> {
		let (token, _) = self.advance()?;
		(token == expected).then_some(())
	}

	fn is_done(&self) -> bool {
		self.cursor >= self.tokens.len()
	}

	fn parse_value(&mut self, depth: usize) -> Option<Value> {
		if depth > MAX_DEPTH {
			return None;
		}

		let (token, slice) = self.advance()?;
		match token {
			LiteralToken::BraceOpen => self.parse_object(depth),
			LiteralToken::BracketOpen => self.parse_array(depth),
			LiteralToken::DoubleQuotedString | LiteralToken::SingleQuotedString => {
				parse_string(slice).map(Value::String)
			}
			LiteralToken::Number => parse_number(slice).map(Value::Number),
			LiteralToken::Ident => {
				match slice {
					"true" => Some(Value::Bool(true)),
					"false" => Some(Value::Bool(false)),
					"null" | "undefined" => Some(Value::Null),
					// Free identifiers would need an evaluator.
					_ => None,
				}
			}
			LiteralToken::BraceClose
			| LiteralToken::BracketClose
			| LiteralToken::Colon
			| LiteralToken::Comma => None,
		}
	}

	fn parse_object(&mut self, depth: usize) -> Option<Value> {
		let mut map = Map::new();

		loop {
			let (token, slice) = self.advance()?;
			let key = match token {
				LiteralToken::BraceClose => return Some(Value::Object(map)),
				LiteralToken::Ident | LiteralToken::Number => slice.to_string(),
				LiteralToken::DoubleQuotedString | LiteralToken::SingleQuotedString => {
					parse_string(slice)?
				}
				_ => return None,
			};

			self.expect(LiteralToken::Colon)?;
			let value = self.parse_value(depth + 1)?;
			map.insert(key, value);

			match self.advance()? {
				(LiteralToken::Comma, _) => {}
				(LiteralToken::BraceClose, _) => return Some(Value::Object(map)),
				_ => return None,
			}
		}
	}

	fn parse_array(&mut self, depth: usize) -> Option<Value> {
		let mut items = vec![];

		loop {
			if self.peek() == Some(LiteralToken::BracketClose) {
				self.advance();
				return Some(Value::Array(items));
			}

			items.push(self.parse_value(depth + 1)?);

			match self.advance()? {
				(LiteralToken::Comma, _) => {}
				(LiteralToken::BracketClose, _) => return Some(Value::Array(items)),
				_ => return None,
			}
		}
	}
}

/// Resolve the escapes of a quoted string token.
///
/// Single quoted strings are re-quoted with double quotes so both forms
/// share the double quoted escape rules.
fn parse_string(slice: &str) -> Option<String> {
	if slice.starts_with('"') {
		return unescape(slice).ok();
	}

	let inner = &slice[1..slice.len() - 1];
	let mut quoted = String::with_capacity(slice.len() + 2);
	quoted.push('"');
	let mut chars = inner.chars();
	while let Some(ch) = chars.next() {
		match ch {
			'\\' => {
				quoted.push(ch);
				quoted.extend(chars.next());
			}
			'"' => quoted.push_str("\\\""),
			_ => quoted.push(ch),
		}
	}
	quoted.push('"');

	unescape(&quoted).ok()
}

fn parse_number(slice: &str) -> Option<Number> {
	let is_float = slice.contains('.') || slice.contains('e') || slice.contains('E');
	if is_float {
		slice.parse::<f64>().ok().and_then(Number::from_f64)
	} else {
		slice.parse::<i64>().ok().map(Number::from)
	}
}

/// Parse a literal expression such as `{core:false, name:'m0'}`.
///
/// Returns `None` for empty input and for anything outside the grammar.
pub fn parse_literal(source: &str) -> Option<Value> {
	let mut parser = LiteralParser::new(source)?;
	if parser.is_done() {
		return None;
	}

	let value = parser.parse_value(0)?;
	parser.is_done().then_some(value)
}
