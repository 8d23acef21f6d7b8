use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::literal::parse_literal;

/// A build instruction hidden in an html comment.
///
/// ```html
/// <!-- @STYLE {core:false, inline:true} -->
/// <link href="./a.css" rel="stylesheet"/>
/// <!-- /@STYLE -->
/// ```
///
/// The opening comment yields `{command: "STYLE", config: {...}, closed:
/// false}` and the closing comment `{command: "STYLE", closed: true}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directive {
	/// The upper-cased command name.
	pub command: String,
	/// The literal payload of an opening directive. `None` when absent or
	/// malformed.
	pub config: Option<Value>,
	/// `true` for `/@COMMAND`.
	pub closed: bool,
}

impl Directive {
	/// The boolean stored under `key`, if the payload holds one.
	pub fn flag(&self, key: &str) -> Option<bool> {
		self.value(key).and_then(Value::as_bool)
	}

	/// Javascript-style truthiness of the value stored under `key`. Missing
	/// keys are falsy.
	pub fn truthy(&self, key: &str) -> bool {
		match self.value(key) {
			None | Some(Value::Null) => false,
			Some(Value::Bool(value)) => *value,
			Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0),
			Some(Value::String(text)) => !text.is_empty(),
			Some(Value::Array(_) | Value::Object(_)) => true,
		}
	}

	/// The string stored under `key`, if the payload holds one.
	pub fn text(&self, key: &str) -> Option<&str> {
		self.value(key).and_then(Value::as_str)
	}

	fn value(&self, key: &str) -> Option<&Value> {
		self.config.as_ref().and_then(|config| config.get(key))
	}
}

/// Parse the text of an html comment as a directive.
///
/// - `@NAME payload` opens a directive. The name runs up to the first
///   whitespace or `{` and is upper-cased; the rest is parsed as a literal.
/// - `/@NAME` closes a directive.
/// - Anything else is an ordinary comment and yields `None`.
pub fn parse_directive(comment: &str) -> Option<Directive> {
	let comment = comment.trim();

	if let Some(rest) = comment.strip_prefix('@') {
		let split = rest
			.find(|ch: char| ch.is_whitespace() || ch == '{')
			.unwrap_or(rest.len());
		let (name, payload) = rest.split_at(split);

		return Some(Directive {
			command: name.to_uppercase(),
			config: parse_literal(payload),
			closed: false,
		});
	}

	comment.strip_prefix("/@").map(|name| {
		Directive {
			command: name.to_uppercase(),
			config: None,
			closed: true,
		}
	})
}
