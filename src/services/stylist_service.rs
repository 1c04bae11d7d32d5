// src/services/stylist_service.rs
use crate::errors::StylistError;
use crate::models::*;
use crate::services::conversation::ChatSession;
use crate::services::gemini::{Content, GenerativeProvider};
use crate::services::normalizer::normalize_analysis;
use crate::services::prompts::ANALYSIS_PROMPT;
use crate::services::upload::EncodedImage;
use log::info;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Analysis and chat pipelines on top of a generative provider.
pub struct StylistService {
    provider: Arc<dyn GenerativeProvider>,
}

impl StylistService {
    pub fn new(provider: Arc<dyn GenerativeProvider>) -> Self {
        Self { provider }
    }

    pub async fn analyze_image(
        &self,
        image: &EncodedImage,
    ) -> Result<NormalizedAnalysis, StylistError> {
        let start = Instant::now();
        let contents = vec![Content::text_with_image(
            ANALYSIS_PROMPT,
            &image.mime_type,
            &image.data,
        )];

        let text = self.provider.generate(contents).await?;
        let analysis = normalize_analysis(&text);

        info!(
            "Analyzed {} byte {} image in {}ms (fallback: {})",
            image.size,
            image.mime_type,
            start.elapsed().as_millis(),
            analysis.raw_response.is_some()
        );
        Ok(analysis)
    }

    /// Runs one chat exchange and returns the reply with the updated transcript.
    ///
    /// With `message` the text is appended as a new user turn; without it the
    /// trailing user turn of `history` is answered. An empty history is seeded
    /// from `initial_analysis` when one is given.
    pub async fn chat(
        &self,
        history: Vec<ChatTurn>,
        message: Option<&str>,
        initial_analysis: Option<&NormalizedAnalysis>,
    ) -> Result<(StructuredChatReply, Vec<ChatTurn>), StylistError> {
        let mut session = match initial_analysis {
            Some(analysis) if history.is_empty() => ChatSession::new(analysis),
            _ => ChatSession::from_history(history),
        };

        let reply = match message {
            Some(text) => session.send_turn(self.provider.as_ref(), text).await?,
            None => session.respond(self.provider.as_ref()).await?,
        };

        info!("Chat session now holds {} turn(s)", session.history().len());
        Ok((reply, session.into_history()))
    }

    pub async fn list_models(&self) -> Result<Value, StylistError> {
        self.provider.list_models().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gemini::{MockGenerativeProvider, Part};
    use crate::services::prompts::SESSION_OPENING_REQUEST;

    fn image() -> EncodedImage {
        EncodedImage {
            mime_type: "image/png".to_string(),
            data: "iVBORw0KGgo=".to_string(),
            size: 8,
        }
    }

    #[tokio::test]
    async fn analysis_sends_prompt_with_inline_image() {
        let mut provider = MockGenerativeProvider::new();
        provider
            .expect_generate()
            .withf(|contents| {
                contents.len() == 1
                    && matches!(&contents[0].parts[0], Part::Text { text } if text == ANALYSIS_PROMPT)
                    && matches!(
                        &contents[0].parts[1],
                        Part::InlineData { inline_data }
                            if inline_data.mime_type == "image/png" && inline_data.data == "iVBORw0KGgo="
                    )
            })
            .times(1)
            .returning(|_| Ok("{\"dominantColors\":[\"navy\"]}".to_string()));

        let service = StylistService::new(Arc::new(provider));
        let analysis = service.analyze_image(&image()).await.unwrap();
        assert_eq!(analysis.dominant_colors, vec!["navy"]);
    }

    #[tokio::test]
    async fn unparseable_analysis_is_not_an_error() {
        let mut provider = MockGenerativeProvider::new();
        provider
            .expect_generate()
            .returning(|_| Ok("Sorry, I can only describe the outfit in words.".to_string()));

        let service = StylistService::new(Arc::new(provider));
        let analysis = service.analyze_image(&image()).await.unwrap();
        assert_eq!(
            analysis.raw_response.as_deref(),
            Some("Sorry, I can only describe the outfit in words.")
        );
    }

    #[tokio::test]
    async fn provider_errors_propagate_from_analysis() {
        let mut provider = MockGenerativeProvider::new();
        provider.expect_generate().returning(|_| {
            Err(StylistError::Provider {
                status: Some(503),
                details: "overloaded".to_string(),
            })
        });

        let service = StylistService::new(Arc::new(provider));
        let err = service.analyze_image(&image()).await.unwrap_err();
        assert!(matches!(err, StylistError::Provider { status: Some(503), .. }));
    }

    #[tokio::test]
    async fn chat_seeds_empty_history_from_initial_analysis() {
        let mut provider = MockGenerativeProvider::new();
        provider
            .expect_generate()
            .withf(|contents| contents.len() == 4)
            .times(1)
            .returning(|_| {
                Ok("{\"answer\":\"Go for loafers\",\"followUpQuestion\":\"Office?\",\"suggestedReplies\":[\"Yes\",\"No\"]}".to_string())
            });

        let service = StylistService::new(Arc::new(provider));
        let analysis = normalize_analysis("{\"dominantColors\":[\"navy\"]}");
        let (reply, history) = service
            .chat(Vec::new(), Some("Which shoes?"), Some(&analysis))
            .await
            .unwrap();

        assert_eq!(reply.answer, "Go for loafers");
        assert_eq!(history.len(), 4);
        assert_eq!(history[0], ChatTurn::user(SESSION_OPENING_REQUEST));
        assert_eq!(history[3], ChatTurn::model("Go for loafers"));
    }
}
