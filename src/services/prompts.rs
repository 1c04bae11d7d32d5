// src/services/prompts.rs
// Fixed prompt text and fallback strings shared by the analysis and chat pipelines.

pub const ANALYSIS_PROMPT: &str = r##"
Analyze this fashion image and provide detailed, personalized color recommendations.
Respond with a single JSON object and nothing else, using exactly this structure:

{
  "skinToneAnalysis": {
    "detected": true,
    "undertone": "warm | cool | neutral",
    "season": "spring | summer | autumn | winter",
    "confidence": "high | medium | low",
    "reasoning": "Why you reached this assessment"
  },
  "colorAnalysis": {
    "imagePalette": [
      { "name": "navy", "hex": "#1e3a8a", "role": "base | secondary | accent", "item": "blazer" }
    ],
    "suggestedPalettes": [
      {
        "name": "Soft Neutrals",
        "description": "Why this palette works with the outfit",
        "colors": [ { "name": "cream", "hex": "#fefce8" } ]
      }
    ],
    "colorPsychology": {
      "emotionalImpact": "What these colors make the wearer feel",
      "socialPerception": "How others perceive these colors"
    }
  },
  "styleGuide": {
    "seasonalFit": {
      "bestSeasons": ["autumn"],
      "avoidSeasons": ["summer"],
      "rationale": "Why these seasons suit the palette"
    },
    "suggestionsByOccasion": {
      "work": { "text": "A concrete outfit suggestion", "visuals": ["blazer", "loafers"] },
      "casual": { "text": "A concrete outfit suggestion", "visuals": ["jeans", "sneakers"] },
      "evening": { "text": "A concrete outfit suggestion", "visuals": ["dress", "heels"] }
    }
  },
  "conversation": {
    "openingLine": "One friendly sentence that mentions a highlight of the palette and asks a question.",
    "suggestedReplies": ["A casual day out", "A formal event", "Show me products"]
  }
}

Rules:
1. imagePalette lists the main colors actually worn in the image, with the garment each one appears on.
2. suggestedPalettes offers two or three palettes that complement the outfit.
3. If no face or skin is clearly visible, set skinToneAnalysis.detected to false and explain why in reasoning.
4. visuals are short garment or accessory nouns.
5. suggestedReplies holds three short options the user might want to explore next.

Focus on practical, wearable color combinations and avoid orange tones as they are not preferred.
"##;

pub const CHAT_SYSTEM_INSTRUCTION: &str = "IMPORTANT: You are a fashion stylist continuing a conversation. \
The initial image analysis has already been completed and is included in the chat history below. \
Do NOT ask for the image or outfit description again. \
Answer the user's latest query based on the analysis context provided. \
Respond ONLY with a JSON object with exactly these keys: \
\"answer\" (string, your reply), \
\"followUpQuestion\" (string, one short question to keep the conversation going) and \
\"suggestedReplies\" (array of two to four short strings the user could send next).";

/// Synthetic first user turn of every chat session.
pub const SESSION_OPENING_REQUEST: &str = "Analyze this image and give me fashion advice.";

pub const DEFAULT_OPENING_LINE: &str =
    "Great! I've analyzed your fashion image. What would you like to know more about?";

pub const DEFAULT_SUGGESTED_REPLIES: [&str; 3] = [
    "Tell me about the colors",
    "What occasions work best?",
    "Show me style suggestions",
];

pub const DEFAULT_FOLLOW_UP_QUESTION: &str = "Is there anything else you'd like to know about your look?";

pub const DEFAULT_CHAT_REPLIES: [&str; 3] = [
    "What's the occasion?",
    "Show me shoe options",
    "I don't like these colors",
];

pub const FALLBACK_SEASONAL_RECOMMENDATIONS: &str = "Analysis completed";
pub const FALLBACK_COLOR_PSYCHOLOGY: &str = "Color analysis provided";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_prompt_carries_the_whole_schema() {
        assert!(ANALYSIS_PROMPT.contains("\"#1e3a8a\""));
        assert!(ANALYSIS_PROMPT.contains("\"#fefce8\""));
        assert!(ANALYSIS_PROMPT.contains("\"conversation\""));
        assert!(ANALYSIS_PROMPT.contains("\"suggestedReplies\""));
        assert!(ANALYSIS_PROMPT.trim_end().ends_with("not preferred."));
    }
}
