use tracing::warn;

use crate::PackError;
use crate::PackResult;

/// Shrinks the script content of a merge group.
pub trait Minifier {
	/// Minify `source`, the content of the bundle called `name`.
	fn minify(&self, name: &str, source: &str) -> PackResult<String>;
}

/// A conservative minifier: removes `//` and `/* */` comments outside string
/// and regex literals, trailing whitespace and blank lines. Nothing else is
/// rewritten.
///
/// Sources it cannot scan with confidence, such as an unterminated string,
/// are returned unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommentStripper;

enum State {
	Normal,
	AfterSlash { regex_allowed: bool },
	InString(char),
	InStringEscape(char),
	InRegex,
	InRegexEscape,
	InRegexClass,
	InRegexClassEscape,
	InBlockComment,
	InBlockCommentEnd,
	InLineComment,
}

enum Stripped {
	Done(String),
	Unsure(&'static str),
}

/// Characters after which a `/` opens a regex literal rather than a division.
const REGEX_PREFIX: &str = "(,=:[!&|?{};+-*%<>~^";

impl CommentStripper {
	fn strip_comments(source: &str) -> Result<Stripped, String> {
		let mut output = String::with_capacity(source.len());
		let mut state = State::Normal;
		let mut last_significant: Option<char> = None;

		for ch in source.chars() {
			state = match state {
				State::Normal => {
					output.push(ch);
					match ch {
						'"' | '\'' | '`' => State::InString(ch),
						'/' => {
							State::AfterSlash {
								regex_allowed: last_significant
									.is_none_or(|prev| REGEX_PREFIX.contains(prev)),
							}
						}
						_ => {
							if !ch.is_whitespace() {
								last_significant = Some(ch);
							}
							State::Normal
						}
					}
				}
				State::AfterSlash { regex_allowed } => {
					match ch {
						'*' => {
							output.pop();
							State::InBlockComment
						}
						'/' => {
							output.pop();
							State::InLineComment
						}
						_ if regex_allowed => {
							output.push(ch);
							match ch {
								'\\' => State::InRegexEscape,
								'[' => State::InRegexClass,
								'\n' | '\r' => return Ok(Stripped::Unsure("unterminated regex literal")),
								_ => State::InRegex,
							}
						}
						_ => {
							// Division.
							last_significant = Some('/');
							output.push(ch);
							match ch {
								'"' | '\'' | '`' => State::InString(ch),
								_ => {
									if !ch.is_whitespace() {
										last_significant = Some(ch);
									}
									State::Normal
								}
							}
						}
					}
				}
				State::InString(quote) => {
					output.push(ch);
					if ch == '\\' {
						State::InStringEscape(quote)
					} else if ch == quote {
						last_significant = Some(ch);
						State::Normal
					} else if ch == '\n' && quote != '`' {
						return Ok(Stripped::Unsure("unterminated string literal"));
					} else {
						State::InString(quote)
					}
				}
				State::InStringEscape(quote) => {
					output.push(ch);
					State::InString(quote)
				}
				State::InRegex => {
					output.push(ch);
					match ch {
						'\\' => State::InRegexEscape,
						'[' => State::InRegexClass,
						'/' => {
							last_significant = Some(ch);
							State::Normal
						}
						'\n' | '\r' => return Ok(Stripped::Unsure("unterminated regex literal")),
						_ => State::InRegex,
					}
				}
				State::InRegexEscape => {
					output.push(ch);
					State::InRegex
				}
				State::InRegexClass => {
					output.push(ch);
					match ch {
						'\\' => State::InRegexClassEscape,
						']' => State::InRegex,
						'\n' | '\r' => return Ok(Stripped::Unsure("unterminated regex literal")),
						_ => State::InRegexClass,
					}
				}
				State::InRegexClassEscape => {
					output.push(ch);
					State::InRegexClass
				}
				State::InBlockComment => {
					if ch == '*' {
						State::InBlockCommentEnd
					} else {
						State::InBlockComment
					}
				}
				State::InBlockCommentEnd => {
					match ch {
						'/' => State::Normal,
						'*' => State::InBlockCommentEnd,
						_ => State::InBlockComment,
					}
				}
				State::InLineComment => {
					if ch == '\n' || ch == '\r' {
						output.push(ch);
						State::Normal
					} else {
						State::InLineComment
					}
				}
			};
		}

		match state {
			State::InBlockComment | State::InBlockCommentEnd => {
				Err("unterminated block comment".to_string())
			}
			State::InString(_) | State::InStringEscape(_) => {
				Ok(Stripped::Unsure("unterminated string literal"))
			}
			State::InRegex
			| State::InRegexEscape
			| State::InRegexClass
			| State::InRegexClassEscape => Ok(Stripped::Unsure("unterminated regex literal")),
			State::Normal | State::AfterSlash { .. } | State::InLineComment => {
				Ok(Stripped::Done(output))
			}
		}
	}
}

impl Minifier for CommentStripper {
	fn minify(&self, name: &str, source: &str) -> PackResult<String> {
		let stripped = Self::strip_comments(source).map_err(|reason| {
			PackError::Minify {
				name: name.to_string(),
				reason,
			}
		})?;

		let stripped = match stripped {
			Stripped::Done(stripped) => stripped,
			Stripped::Unsure(reason) => {
				warn!(bundle = name, reason, "left script unminified");
				return Ok(source.to_string());
			}
		};

		Ok(stripped
			.lines()
			.map(str::trim_end)
			.filter(|line| !line.is_empty())
			.collect::<Vec<_>>()
			.join("\n"))
	}
}
