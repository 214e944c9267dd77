//! Dialogue nodes, choice options, and the stage directives they carry.

use serde::{Deserialize, Deserializer, Serialize};

/// Successor id marking the end of a chapter.
pub const TERMINAL_ID: &str = "END";

/// Directive value that empties a stage slot.
pub const REMOVE_DIRECTIVE: &str = "REMOVE";

/// True for ids that end the chapter rather than name a node.
pub fn is_terminal_id(id: &str) -> bool {
    id.is_empty() || id == TERMINAL_ID
}

/// A named display position on the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Slot {
    Background,
    CharLeft,
    CharCenter,
    CharRight,
    Cg,
}

impl Slot {
    /// Every slot, in stage layering order (back to front).
    pub const ALL: [Slot; 5] = [
        Slot::Background,
        Slot::CharLeft,
        Slot::CharCenter,
        Slot::CharRight,
        Slot::Cg,
    ];

    /// Returns the chapter-format field name for this slot (e.g., "charLeft").
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::CharLeft => "charLeft",
            Self::CharCenter => "charCenter",
            Self::CharRight => "charRight",
            Self::Cg => "cgImage",
        }
    }
}

/// What a node asks a slot to do when it is played.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Directive {
    /// Leave the slot as it is.
    Keep,
    /// Empty the slot.
    Clear,
    /// Display the named asset.
    Show(String),
}

impl Directive {
    /// Interpret a raw directive field: absent or empty keeps, `REMOVE`
    /// clears, anything else names an asset.
    pub fn from_field(field: Option<&str>) -> Self {
        match field {
            None | Some("") => Self::Keep,
            Some(REMOVE_DIRECTIVE) => Self::Clear,
            Some(name) => Self::Show(name.to_string()),
        }
    }

    pub fn show(name: impl Into<String>) -> Self {
        Self::Show(name.into())
    }

    pub fn is_keep(&self) -> bool {
        matches!(self, Self::Keep)
    }
}

/// One selectable option offered by a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceOption {
    pub id: String,
    #[serde(default)]
    pub text: String,
    pub target_id: String,
}

/// A single unit of narrative content: speaker, text, stage directives,
/// and either a successor or a set of options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueNode {
    pub id: String,
    #[serde(default)]
    pub speaker: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub char_left: Option<String>,
    #[serde(default)]
    pub char_center: Option<String>,
    #[serde(default)]
    pub char_right: Option<String>,
    #[serde(default)]
    pub cg_image: Option<String>,
    #[serde(default)]
    pub next_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub options: Vec<ChoiceOption>,
}

impl DialogueNode {
    /// A bare node with content and a successor, no stage directives.
    pub fn line(id: &str, speaker: &str, content: &str, next_id: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            speaker: speaker.to_string(),
            content: content.to_string(),
            background: None,
            char_left: None,
            char_center: None,
            char_right: None,
            cg_image: None,
            next_id: next_id.map(str::to_string),
            options: Vec::new(),
        }
    }

    /// The raw directive field for a slot.
    pub fn slot_field(&self, slot: Slot) -> Option<&str> {
        match slot {
            Slot::Background => self.background.as_deref(),
            Slot::CharLeft => self.char_left.as_deref(),
            Slot::CharCenter => self.char_center.as_deref(),
            Slot::CharRight => self.char_right.as_deref(),
            Slot::Cg => self.cg_image.as_deref(),
        }
    }

    pub fn directive(&self, slot: Slot) -> Directive {
        Directive::from_field(self.slot_field(slot))
    }

    /// The successor id, or `None` when this node ends the chapter.
    pub fn successor(&self) -> Option<&str> {
        self.next_id.as_deref().filter(|id| !is_terminal_id(id))
    }

    pub fn has_options(&self) -> bool {
        !self.options.is_empty()
    }

    pub fn option(&self, option_id: &str) -> Option<&ChoiceOption> {
        self.options.iter().find(|o| o.id == option_id)
    }
}

/// A chapter document as authored: an id plus its dialogue nodes in
/// document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub chapter_id: String,
    #[serde(default)]
    pub chapter_name: String,
    #[serde(default)]
    pub dialogues: Vec<DialogueNode>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<ChoiceOption>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ChoiceOption>>::deserialize(deserializer)?.unwrap_or_default())
}
