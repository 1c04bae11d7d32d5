// src/models.rs
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Reads `null` as the type's default so one blank value never rejects its record.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One message of the chat transcript.
///
/// Always serialized as `{role, text}`. On input the provider-native
/// `{role, parts: [{text}]}` form is accepted as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ChatTurnWire")]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChatTurnWire {
    Plain { role: Role, text: String },
    Parts { role: Role, parts: Vec<TextPart> },
}

#[derive(Deserialize)]
struct TextPart {
    #[serde(default)]
    text: String,
}

impl From<ChatTurnWire> for ChatTurn {
    fn from(wire: ChatTurnWire) -> Self {
        match wire {
            ChatTurnWire::Plain { role, text } => ChatTurn { role, text },
            ChatTurnWire::Parts { role, parts } => ChatTurn {
                role,
                text: parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join(""),
            },
        }
    }
}

/// A quick-reply chip. Providers send either a bare string or `{text, action}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SuggestedReplyWire")]
pub struct SuggestedReply {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SuggestedReplyWire {
    Plain(String),
    Tagged {
        text: String,
        #[serde(default)]
        action: Option<String>,
    },
}

impl From<SuggestedReplyWire> for SuggestedReply {
    fn from(wire: SuggestedReplyWire) -> Self {
        match wire {
            SuggestedReplyWire::Plain(text) => SuggestedReply { text, action: None },
            SuggestedReplyWire::Tagged { text, action } => SuggestedReply { text, action },
        }
    }
}

impl From<&str> for SuggestedReply {
    fn from(text: &str) -> Self {
        SuggestedReply {
            text: text.to_string(),
            action: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredChatReply {
    pub answer: String,
    pub follow_up_question: String,
    pub suggested_replies: Vec<SuggestedReply>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkinToneAnalysis {
    #[serde(default)]
    pub detected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undertone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaletteColor {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hex: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
}

impl PaletteColor {
    /// The name when the model gave one, otherwise the hex code.
    pub fn label(&self) -> &str {
        if self.name.trim().is_empty() {
            self.hex.trim()
        } else {
            self.name.trim()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedPalette {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub colors: Vec<PaletteColor>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonalFit {
    #[serde(default)]
    pub best_seasons: Vec<String>,
    #[serde(default)]
    pub avoid_seasons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeasonalRecommendations {
    Summary(String),
    Detailed(SeasonalFit),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorPsychology {
    Summary(String),
    Detailed(ColorPsychologyDetail),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorPsychologyDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotional_impact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_perception: Option<String>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OccasionSuggestion {
    Text(String),
    Detailed {
        text: String,
        #[serde(default)]
        visuals: Vec<String>,
    },
}

impl OccasionSuggestion {
    pub fn text(&self) -> &str {
        match self {
            OccasionSuggestion::Text(text) => text,
            OccasionSuggestion::Detailed { text, .. } => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StyleSuggestions {
    List(Vec<String>),
    ByCategory(BTreeMap<String, Vec<StyleTip>>),
}

impl StyleSuggestions {
    pub fn is_empty(&self) -> bool {
        match self {
            StyleSuggestions::List(items) => items.is_empty(),
            StyleSuggestions::ByCategory(categories) => categories.values().all(Vec::is_empty),
        }
    }

    pub fn titles(&self) -> Vec<&str> {
        match self {
            StyleSuggestions::List(items) => items.iter().map(String::as_str).collect(),
            StyleSuggestions::ByCategory(categories) => categories
                .values()
                .flatten()
                .map(StyleTip::title)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StyleTip {
    Plain(String),
    Detailed {
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        icon: Option<String>,
    },
}

impl StyleTip {
    pub fn title(&self) -> &str {
        match self {
            StyleTip::Plain(title) => title,
            StyleTip::Detailed { title, .. } => title,
        }
    }
}

/// Canonical analysis record every provider response shape is mapped into.
///
/// Each field renders independently; a missing one never hides the others.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedAnalysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skin_tone_analysis: Option<SkinToneAnalysis>,
    #[serde(default)]
    pub image_palette: Vec<PaletteColor>,
    #[serde(default)]
    pub suggested_palettes: Vec<SuggestedPalette>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_psychology: Option<ColorPsychology>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seasonal_fit: Option<SeasonalFit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions_by_occasion: Option<BTreeMap<String, OccasionSuggestion>>,

    // Legacy fields kept for clients that predate the palette-based shape.
    #[serde(default)]
    pub dominant_colors: Vec<String>,
    #[serde(default)]
    pub complementary_colors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seasonal_recommendations: Option<SeasonalRecommendations>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_suggestions: Option<StyleSuggestions>,

    #[serde(default)]
    pub opening_line: String,
    #[serde(default)]
    pub suggested_replies: Vec<SuggestedReply>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub history: Vec<ChatTurn>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub initial_analysis: Option<NormalizedAnalysis>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub success: bool,
    pub analysis: NormalizedAnalysis,
    pub original_image: String,
    pub chat_history: Vec<ChatTurn>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub success: bool,
    #[serde(flatten)]
    pub reply: StructuredChatReply,
    pub history: Vec<ChatTurn>,
}
