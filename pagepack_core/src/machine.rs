use serde::Deserialize;
use serde::Serialize;

use crate::PackError;
use crate::PackResult;
use crate::directive::Directive;
use crate::directive::parse_directive;
use crate::lexer::tokenize;
use crate::tokens::Attributes;
use crate::tokens::Buffer;
use crate::tokens::CommentEvent;
use crate::tokens::MarkupEvent;
use crate::tokens::TagEvent;
use crate::tokens::TextEvent;

/// The content state of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentState {
	/// Plain markup.
	Text,
	/// Inside `<style>...</style>`.
	Style,
	/// Inside `<script>...</script>`.
	Script,
	/// Inside `<textarea>...</textarea>`.
	Textarea,
	/// Transition signal meaning "handled, emit nothing". Never stored as
	/// the current state.
	NoMatch,
}

/// The kind of a captured resource region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
	Style,
	Script,
	Textarea,
}

impl ResourceKind {
	pub fn state(self) -> ContentState {
		match self {
			Self::Style => ContentState::Style,
			Self::Script => ContentState::Script,
			Self::Textarea => ContentState::Textarea,
		}
	}

	pub fn tag_name(self) -> &'static str {
		match self {
			Self::Style => "style",
			Self::Script => "script",
			Self::Textarea => "textarea",
		}
	}
}

/// The fixed set of tag names with special handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
	Style,
	Script,
	Textarea,
	Link,
	Other,
}

impl TagKind {
	fn from_name(name: &str) -> Self {
		match name.to_ascii_lowercase().as_str() {
			"style" => Self::Style,
			"script" => Self::Script,
			"textarea" => Self::Textarea,
			"link" => Self::Link,
			_ => Self::Other,
		}
	}
}

/// Result of looking up a tag in the transition table.
enum Transition {
	Begin(ResourceKind),
	End(ResourceKind),
	/// Fully handled by the transform; the caller does nothing else.
	NoMatch,
	/// Not a transition; the tag's source is kept as content.
	Unmatched,
}

/// Emitted when a style, script or textarea region closes.
pub struct ResourceEvent<'a> {
	pub kind: ResourceKind,
	/// The tag that closed the region. For `<link>` this is the link itself.
	pub tag: &'a TagEvent,
	/// The source of the tag that opened the region.
	pub begin: &'a str,
	/// Attributes captured from the tag that opened the region.
	pub config: &'a Attributes,
	/// The captured body. A visitor may rewrite it in place.
	pub source: String,
	pub buffer: &'a mut Buffer,
}

/// Emitted for a comment that parses as a [`Directive`].
pub struct InstructionEvent<'a> {
	pub directive: &'a Directive,
	/// The raw comment source including `<!--` and `-->`.
	pub source: &'a str,
	pub buffer: &'a mut Buffer,
}

/// Receives the semantic events of a scan.
///
/// Every method has a no-op default. Methods returning `Option<String>` may
/// return a replacement that is written to the buffer instead of the
/// original source.
#[allow(unused_variables)]
pub trait ContentVisitor {
	/// A resource region closed. `Some(value)` replaces the open tag, body
	/// and close tag.
	fn on_resource(&mut self, event: &mut ResourceEvent<'_>) -> Option<String> {
		None
	}

	/// Text captured inside a resource region.
	fn on_resource_text(&mut self, source: &str, buffer: &mut Buffer) -> Option<String> {
		None
	}

	/// A directive comment. Nothing is written to the buffer by default.
	fn on_instruction(&mut self, event: InstructionEvent<'_>) {}

	/// A tag with no special handling, outside any resource region.
	fn on_tag(&mut self, tag: &TagEvent, buffer: &mut Buffer) -> Option<String> {
		None
	}

	/// A plain text run outside any resource region.
	fn on_text(&mut self, source: &str, buffer: &mut Buffer) -> Option<String> {
		None
	}

	/// A comment that is not a directive.
	fn on_comment(&mut self, source: &str, buffer: &mut Buffer) -> Option<String> {
		None
	}
}

/// A visitor that keeps every event as written.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl ContentVisitor for PassThrough {}

/// Turns lexical markup events into semantic regions.
pub struct StateMachine<V> {
	state: ContentState,
	previous_state: ContentState,
	buffer: Buffer,
	/// Text collected since the last transition. While a resource region is
	/// open the first entry is the opening tag's source.
	pending_text: Vec<String>,
	/// The tag that opened the current resource region.
	pending_tag: Option<TagEvent>,
	visitor: V,
}

impl<V: ContentVisitor> StateMachine<V> {
	pub fn new(visitor: V) -> Self {
		Self {
			state: ContentState::Text,
			previous_state: ContentState::Text,
			buffer: Buffer::new(),
			pending_text: vec![],
			pending_tag: None,
			visitor,
		}
	}

	pub fn state(&self) -> ContentState {
		self.state
	}

	pub fn previous_state(&self) -> ContentState {
		self.previous_state
	}

	/// The buffer built so far.
	pub fn dump(&self) -> &Buffer {
		&self.buffer
	}

	pub fn visitor(&self) -> &V {
		&self.visitor
	}

	pub fn feed(&mut self, event: &MarkupEvent) {
		match event {
			MarkupEvent::Tag(tag) => self.feed_tag(tag),
			MarkupEvent::Text(text) => self.feed_text(text),
			MarkupEvent::Comment(comment) => self.feed_comment(comment),
		}
	}

	pub fn feed_tag(&mut self, tag: &TagEvent) {
		let kind = TagKind::from_name(&tag.name);

		if kind == TagKind::Other {
			if self.state == ContentState::Text {
				if let Some(value) = self.visitor.on_tag(tag, &mut self.buffer) {
					self.buffer.push(value);
					return;
				}
			}
			self.append_text(&tag.source, true);
			return;
		}

		match self.transform(kind, tag) {
			Transition::NoMatch => {}
			Transition::End(resource) => {
				self.end_resource_state(resource, tag, &tag.source);
				self.begin_text_state();
			}
			Transition::Begin(resource) => {
				self.end_text_state();
				self.begin_resource_state(resource, tag);
			}
			Transition::Unmatched => self.append_text(&tag.source, true),
		}
	}

	pub fn feed_text(&mut self, text: &TextEvent) {
		self.append_text(&text.source, text.name.is_some());
	}

	pub fn feed_comment(&mut self, comment: &CommentEvent) {
		if self.is_in_resource_state() {
			self.append_text(&comment.source, true);
			return;
		}

		if let Some(directive) = parse_directive(&comment.comment) {
			self.visitor.on_instruction(InstructionEvent {
				directive: &directive,
				source: &comment.source,
				buffer: &mut self.buffer,
			});
			return;
		}

		let value = self.visitor.on_comment(&comment.source, &mut self.buffer);
		self.buffer
			.push(value.unwrap_or_else(|| comment.source.clone()));
	}

	/// End the scan and hand back the buffer and the visitor.
	///
	/// Fails when the input ended inside a resource region, which means the
	/// lexer never reported the closing tag.
	pub fn finish(mut self, file: &str) -> PackResult<(Buffer, V)> {
		if let Some(resource) = self.current_resource() {
			return Err(PackError::UnclosedRegion {
				tag: resource.tag_name().to_string(),
				file: file.to_string(),
			});
		}

		self.end_text_state();
		Ok((self.buffer, self.visitor))
	}

	fn transform(&mut self, kind: TagKind, tag: &TagEvent) -> Transition {
		let resource = match kind {
			TagKind::Style => ResourceKind::Style,
			TagKind::Script => ResourceKind::Script,
			TagKind::Textarea => ResourceKind::Textarea,
			TagKind::Link => return self.transform_link(tag),
			TagKind::Other => return Transition::Unmatched,
		};

		if self.state == ContentState::Text && tag.is_real_open() {
			if resource == ResourceKind::Style && tag.attrs.has("disabled") {
				return Transition::Unmatched;
			}
			return Transition::Begin(resource);
		}

		if self.state == resource.state() && tag.is_real_close() {
			return Transition::End(resource);
		}

		Transition::Unmatched
	}

	/// An external stylesheet is a style region with an empty body.
	fn transform_link(&mut self, tag: &TagEvent) -> Transition {
		if self.state != ContentState::Text
			|| tag.attrs.non_empty("href").is_none()
			|| tag.attrs.has("disabled")
		{
			return Transition::Unmatched;
		}

		self.end_text_state();
		self.begin_resource_state(ResourceKind::Style, tag);
		self.end_resource_state(ResourceKind::Style, tag, "");
		self.begin_text_state();

		Transition::NoMatch
	}

	fn current_resource(&self) -> Option<ResourceKind> {
		match self.state {
			ContentState::Style => Some(ResourceKind::Style),
			ContentState::Script => Some(ResourceKind::Script),
			ContentState::Textarea => Some(ResourceKind::Textarea),
			ContentState::Text | ContentState::NoMatch => None,
		}
	}

	fn is_in_resource_state(&self) -> bool {
		self.current_resource().is_some()
	}

	fn update_state(&mut self, state: ContentState) {
		self.previous_state = self.state;
		self.state = state;
	}

	fn begin_text_state(&mut self) {
		self.pending_text.clear();
		self.update_state(ContentState::Text);
	}

	fn end_text_state(&mut self) {
		let text = std::mem::take(&mut self.pending_text).concat();
		if text.is_empty() {
			return;
		}

		let value = self.visitor.on_text(&text, &mut self.buffer);
		self.buffer.push(value.unwrap_or(text));
	}

	fn begin_resource_state(&mut self, resource: ResourceKind, tag: &TagEvent) {
		self.pending_tag = Some(tag.clone());
		self.pending_text = vec![tag.source.clone()];
		self.update_state(resource.state());
	}

	fn end_resource_state(&mut self, resource: ResourceKind, tag: &TagEvent, end: &str) {
		let open = self.pending_tag.take();
		let mut parts = std::mem::take(&mut self.pending_text).into_iter();
		let begin = parts.next().unwrap_or_default();
		let body: String = parts.collect();

		let empty = Attributes::new();
		let mut event = ResourceEvent {
			kind: resource,
			tag,
			begin: &begin,
			config: open.as_ref().map_or(&empty, |open| &open.attrs),
			source: body,
			buffer: &mut self.buffer,
		};
		let value = self.visitor.on_resource(&mut event);
		let body = event.source;

		match value {
			Some(value) => self.buffer.push(value),
			None => self.buffer.extend([begin, body, end.to_string()]),
		}
	}

	/// Content that is not a transition: captured while inside a resource
	/// region, otherwise written to the buffer. `named` marks the source of
	/// a tag passing through, which does not raise a text event.
	fn append_text(&mut self, source: &str, named: bool) {
		if self.is_in_resource_state() {
			let value = self.visitor.on_resource_text(source, &mut self.buffer);
			self.pending_text
				.push(value.unwrap_or_else(|| source.to_string()));
			return;
		}

		if !named {
			if let Some(value) = self.visitor.on_text(source, &mut self.buffer) {
				self.buffer.push(value);
				return;
			}
		}

		self.buffer.push(source.to_string());
	}
}

/// Tokenize `content` and run it through a state machine driven by
/// `visitor`. `file` names the input in errors.
pub fn scan_markup<V: ContentVisitor>(
	content: &str,
	file: &str,
	visitor: V,
) -> PackResult<(Buffer, V)> {
	let mut machine = StateMachine::new(visitor);
	for event in tokenize(content) {
		machine.feed(&event);
	}
	machine.finish(file)
}
