//! Message model: elements, chains, sources and long-message references.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Default number of elements rendered into a long-message preview.
pub const DEFAULT_BRIEF_LIMIT: usize = 27;

/// Default number of characters a long-message preview may hold before
/// the truncation marker.
pub const DEFAULT_BRIEF_CHARS: usize = 100;

/// Marker appended to a preview that was cut at either budget.
const BRIEF_TRUNCATED: &str = "...";

const BRIEF_SEPARATOR: &str = ", ";

/// Returns the current Unix time in seconds.
pub fn current_time_seconds() -> i64 {
    Utc::now().timestamp()
}

/// A single element of a message chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageElement {
    /// Plain text.
    Text { text: String },
    /// Mention of a single member, rendered as `display`.
    At { target: u64, display: String },
    /// Mention of every member.
    AtAll,
    /// An image previously uploaded to the server.
    Image { image_id: String },
    /// A built-in sticker.
    Face { id: u32 },
    /// Reference to content stored through the long-message transfer.
    LongMessage(MessageReference),
}

impl MessageElement {
    /// Creates a text element.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Creates a mention element; the display name is prefixed with `@`.
    pub fn at(target: u64, name: impl AsRef<str>) -> Self {
        Self::At {
            target,
            display: format!("@{}", name.as_ref()),
        }
    }

    /// Label used when this element appears in a preview.
    ///
    /// Elements without a textual form count against the budget but render
    /// as nothing.
    pub fn preview_label(&self) -> &str {
        match self {
            Self::Text { text } => text,
            Self::At { display, .. } => display,
            Self::AtAll => "@all",
            Self::Image { .. } => "[image]",
            Self::Face { .. } => "[sticker]",
            Self::LongMessage(_) => "",
        }
    }

    /// Rough on-wire weight of this element.
    fn estimated_length(&self) -> usize {
        match self {
            Self::Text { text } => text.chars().count(),
            Self::At { .. } | Self::AtAll => 60,
            Self::Image { .. } => 260,
            Self::Face { .. } => 1,
            Self::LongMessage(reference) => {
                reference.resource_id.len() + reference.brief.chars().count()
            }
        }
    }
}

/// An ordered sequence of message elements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageChain(Vec<MessageElement>);

impl MessageChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a chain holding a single text element.
    pub fn plain(text: impl Into<String>) -> Self {
        Self(vec![MessageElement::text(text)])
    }

    /// Creates the short chain that stands in for an uploaded long message.
    pub fn long_message(reference: MessageReference) -> Self {
        Self(vec![MessageElement::LongMessage(reference)])
    }

    /// Builder: append an element.
    #[must_use]
    pub fn with(mut self, element: MessageElement) -> Self {
        self.0.push(element);
        self
    }

    /// Appends an element.
    pub fn push(&mut self, element: MessageElement) {
        self.0.push(element);
    }

    /// Returns the elements.
    pub fn elements(&self) -> &[MessageElement] {
        &self.0
    }

    /// Returns the number of elements.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the chain has no elements.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renders a human-readable preview of at most `limit` elements and
    /// `max_chars` characters.
    ///
    /// Element labels are joined with `", "`; images and stickers become
    /// fixed placeholders. When either budget cuts the preview short it ends
    /// with `...`, so the result never exceeds `max_chars + 3` characters.
    ///
    /// ```rust
    /// use msglink_core::{MessageChain, MessageElement};
    ///
    /// let chain = MessageChain::plain("hello").with(MessageElement::text("world"));
    /// assert_eq!(chain.brief(27, 100), "hello, world");
    /// assert_eq!(chain.brief(1, 100), "hello, ...");
    /// assert_eq!(chain.brief(27, 8), "hello, w...");
    /// ```
    pub fn brief(&self, limit: usize, max_chars: usize) -> String {
        let mut brief = BoundedText::new(max_chars);
        for (index, element) in self.0.iter().enumerate() {
            if index > 0 && !brief.push(BRIEF_SEPARATOR) {
                break;
            }
            if index == limit {
                brief.truncated = true;
                break;
            }
            if !brief.push(element.preview_label()) {
                break;
            }
        }
        brief.finish()
    }

    /// Estimates the encoded length of the chain.
    ///
    /// Stops counting once the running total exceeds `upper`, so the result
    /// is only exact when it is `<= upper`.
    pub fn estimate_length(&self, upper: usize) -> usize {
        let mut total = 0;
        for element in &self.0 {
            total += element.estimated_length();
            if total > upper {
                break;
            }
        }
        total
    }
}

/// A string that stops accepting characters at a fixed budget.
struct BoundedText {
    text: String,
    remaining: usize,
    truncated: bool,
}

impl BoundedText {
    fn new(max_chars: usize) -> Self {
        Self {
            text: String::new(),
            remaining: max_chars,
            truncated: false,
        }
    }

    /// Appends as much of `part` as fits; false once something was cut.
    fn push(&mut self, part: &str) -> bool {
        for c in part.chars() {
            if self.remaining == 0 {
                self.truncated = true;
                return false;
            }
            self.text.push(c);
            self.remaining -= 1;
        }
        true
    }

    fn finish(mut self) -> String {
        if self.truncated {
            self.text.push_str(BRIEF_TRUNCATED);
        }
        self.text
    }
}

impl FromIterator<MessageElement> for MessageChain {
    fn from_iter<I: IntoIterator<Item = MessageElement>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for MessageChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in &self.0 {
            f.write_str(element.preview_label())?;
        }
        Ok(())
    }
}

/// Identifies a previously sent or received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSource {
    /// Account that sent the message.
    pub sender_id: u64,
    /// Group the message was sent in, `0` for direct messages.
    pub group_id: u64,
    /// Recipient of a direct message, `0` for group messages.
    #[serde(default)]
    pub target_id: u64,
    /// Per-session message sequence id.
    pub sequence_id: i32,
    /// Per-message random nonce.
    pub random: i32,
    /// Send time, Unix seconds.
    pub time: i64,
}

impl MessageSource {
    /// Returns true if the message belongs to a group conversation.
    pub fn is_group(&self) -> bool {
        self.group_id != 0
    }

    /// The other party of a direct conversation, as seen by `account`.
    pub fn peer(&self, account: u64) -> u64 {
        if self.sender_id == account {
            self.target_id
        } else {
            self.sender_id
        }
    }

    /// Packed message id: sequence id in the high half, nonce in the low half.
    pub fn id(&self) -> i64 {
        pack_message_id(self.sequence_id, self.random)
    }
}

/// Packs a sequence id and nonce into a single message id.
pub fn pack_message_id(sequence_id: i32, random: i32) -> i64 {
    ((sequence_id as i64) << 32) | (random as u32 as i64)
}

/// Splits a packed message id into `(sequence_id, random)`.
pub fn unpack_message_id(message_id: i64) -> (i32, i32) {
    ((message_id >> 32) as i32, message_id as i32)
}

/// Stands in for long content in the short message that is actually sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReference {
    /// Server handle of the uploaded content.
    pub resource_id: String,
    /// Preview text shown in conversation lists.
    pub brief: String,
    /// Original send time, Unix seconds.
    pub time: i64,
}
