// src/services/conversation.rs
use crate::errors::StylistError;
use crate::models::*;
use crate::services::gemini::{Content, GenerativeProvider};
use crate::services::normalizer::strip_code_fence;
use crate::services::prompts::{
    CHAT_SYSTEM_INSTRUCTION, DEFAULT_CHAT_REPLIES, DEFAULT_FOLLOW_UP_QUESTION,
    SESSION_OPENING_REQUEST,
};
use log::{info, warn};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatReplyPayload {
    answer: String,
    follow_up_question: String,
    suggested_replies: Vec<SuggestedReply>,
}

pub fn default_chat_replies() -> Vec<SuggestedReply> {
    DEFAULT_CHAT_REPLIES
        .iter()
        .map(|reply| SuggestedReply::from(*reply))
        .collect()
}

/// Reply used when the model's chat output is not the expected three-key JSON.
pub fn fallback_reply(raw: &str) -> StructuredChatReply {
    StructuredChatReply {
        answer: raw.to_string(),
        follow_up_question: DEFAULT_FOLLOW_UP_QUESTION.to_string(),
        suggested_replies: default_chat_replies(),
    }
}

/// Decodes a chat reply. Never fails: bad output degrades to [`fallback_reply`].
pub fn parse_chat_reply(text: &str) -> StructuredChatReply {
    match serde_json::from_str::<ChatReplyPayload>(strip_code_fence(text)) {
        Ok(payload) => StructuredChatReply {
            answer: payload.answer,
            follow_up_question: payload.follow_up_question,
            suggested_replies: payload.suggested_replies,
        },
        Err(e) => {
            warn!("Chat reply is not the expected JSON shape ({}), using raw text", e);
            fallback_reply(text)
        }
    }
}

/// Plain-text digest of an analysis, used as the model's first turn.
pub fn summarize_analysis(analysis: &NormalizedAnalysis) -> String {
    if let Some(raw) = &analysis.raw_response {
        return raw.clone();
    }

    let or_na = |value: String| {
        if value.trim().is_empty() {
            "N/A".to_string()
        } else {
            value
        }
    };

    let seasonal = match &analysis.seasonal_recommendations {
        Some(SeasonalRecommendations::Summary(text)) => text.clone(),
        Some(SeasonalRecommendations::Detailed(fit)) => {
            format!("Best for: {}", fit.best_seasons.join(", "))
        }
        None => String::new(),
    };

    let style = analysis
        .style_suggestions
        .as_ref()
        .map(|s| s.titles().join(", "))
        .unwrap_or_default();

    let psychology = match &analysis.color_psychology {
        Some(ColorPsychology::Summary(text)) => text.clone(),
        Some(ColorPsychology::Detailed(detail)) => [&detail.emotional_impact, &detail.social_perception]
            .into_iter()
            .flatten()
            .cloned()
            .collect::<Vec<_>>()
            .join(". "),
        None => String::new(),
    };

    let mut lines = vec![
        format!("Dominant Colors: {}", or_na(analysis.dominant_colors.join(", "))),
        format!(
            "Complementary Colors: {}",
            or_na(analysis.complementary_colors.join(", "))
        ),
        format!("Seasonal Recommendations: {}", or_na(seasonal)),
        format!("Style Suggestions: {}", or_na(style)),
        format!("Color Psychology: {}", or_na(psychology)),
    ];

    if let Some(skin) = analysis.skin_tone_analysis.as_ref().filter(|s| s.detected) {
        let traits: Vec<String> = [
            skin.undertone.as_ref().map(|u| format!("{} undertone", u)),
            skin.season.as_ref().map(|s| format!("{} season", s)),
        ]
        .into_iter()
        .flatten()
        .collect();
        lines.push(format!("Skin Tone: {}", or_na(traits.join(", "))));
    }

    lines.join("\n")
}

/// The two synthetic turns every session starts with.
pub fn initialize_session(analysis: &NormalizedAnalysis) -> Vec<ChatTurn> {
    vec![
        ChatTurn::user(SESSION_OPENING_REQUEST),
        ChatTurn::model(summarize_analysis(analysis)),
    ]
}

/// An append-only transcript of plain `{role, text}` turns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatSession {
    history: Vec<ChatTurn>,
}

impl ChatSession {
    pub fn new(analysis: &NormalizedAnalysis) -> Self {
        Self {
            history: initialize_session(analysis),
        }
    }

    pub fn from_history(history: Vec<ChatTurn>) -> Self {
        Self { history }
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn into_history(self) -> Vec<ChatTurn> {
        self.history
    }

    /// Appends `user_text` and asks the provider for the next model turn.
    ///
    /// A transport failure removes the user turn again so the transcript
    /// never ends in an unanswered message the caller did not resubmit.
    pub async fn send_turn(
        &mut self,
        provider: &dyn GenerativeProvider,
        user_text: &str,
    ) -> Result<StructuredChatReply, StylistError> {
        let user_text = user_text.trim();
        if user_text.is_empty() {
            return Err(StylistError::Validation("Message must not be empty".to_string()));
        }

        self.history.push(ChatTurn::user(user_text));
        match self.respond(provider).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                self.history.pop();
                Err(e)
            }
        }
    }

    /// Answers the trailing user turn already in the history.
    pub async fn respond(
        &mut self,
        provider: &dyn GenerativeProvider,
    ) -> Result<StructuredChatReply, StylistError> {
        match self.history.last() {
            Some(turn) if turn.role == Role::User && !turn.text.trim().is_empty() => {}
            _ => {
                return Err(StylistError::Validation(
                    "History must end with a user message".to_string(),
                ));
            }
        }

        let mut contents = Vec::with_capacity(self.history.len() + 1);
        contents.push(Content::text(Role::User, CHAT_SYSTEM_INSTRUCTION));
        contents.extend(self.history.iter().map(Content::from));

        info!("Sending chat turn with {} history turn(s)", self.history.len());
        let text = provider.generate(contents).await?;

        let reply = parse_chat_reply(&text);
        self.history.push(ChatTurn::model(reply.answer.clone()));
        Ok(reply)
    }
}
