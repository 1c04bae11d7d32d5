// src/services/normalizer.rs
use crate::models::*;
use crate::services::prompts::{
    DEFAULT_OPENING_LINE, DEFAULT_SUGGESTED_REPLIES, FALLBACK_COLOR_PSYCHOLOGY,
    FALLBACK_SEASONAL_RECOMMENDATIONS,
};
use log::{debug, info, warn};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)\r?\n?[ \t]*```")
        .expect("code fence pattern is valid")
});

const SKIN_TONE_ANALYSIS: &str = "skinToneAnalysis";
const COLOR_ANALYSIS: &str = "colorAnalysis";
const STYLE_GUIDE: &str = "styleGuide";
const CONVERSATION: &str = "conversation";
const FULL_ANALYSIS: &str = "fullAnalysis";
const OPENING_LINE: &str = "openingLine";
const SUGGESTED_REPLIES: &str = "suggestedReplies";

/// Returns the body of the first fenced code block, or the whole text when there is none.
pub fn strip_code_fence(text: &str) -> &str {
    match CODE_FENCE.captures(text).and_then(|caps| caps.get(1)) {
        Some(body) => body.as_str().trim(),
        None => text.trim(),
    }
}

pub fn default_suggested_replies() -> Vec<SuggestedReply> {
    DEFAULT_SUGGESTED_REPLIES
        .iter()
        .map(|reply| SuggestedReply::from(*reply))
        .collect()
}

/// Sections of the sectioned response shapes. `rest` holds any other top-level keys.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionedPayload {
    pub skin_tone_analysis: Option<Value>,
    pub color_analysis: Map<String, Value>,
    pub style_guide: Map<String, Value>,
    pub conversation: Map<String, Value>,
    pub rest: Map<String, Value>,
}

/// Every response shape the analysis prompt has produced over time.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderPayload {
    /// `skinToneAnalysis` + `colorAnalysis` + `styleGuide` + `conversation`.
    SkinToneAware(SectionedPayload),
    /// `colorAnalysis` + `styleGuide` + `conversation`.
    Sectioned(SectionedPayload),
    /// `{fullAnalysis: {...}, openingLine?, suggestedReplies?}`.
    Wrapped {
        full_analysis: Map<String, Value>,
        envelope: Map<String, Value>,
    },
    /// Any other JSON object, read as top-level analysis fields.
    Flat(Map<String, Value>),
    /// Not a JSON object at all.
    Unparseable(String),
}

impl ProviderPayload {
    pub fn detect(text: &str) -> Self {
        let candidate = strip_code_fence(text);

        let mut object = match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(object)) => object,
            Ok(_) => {
                warn!("Provider JSON is not an object, falling back to raw response");
                return ProviderPayload::Unparseable(text.to_string());
            }
            Err(e) => {
                warn!("Provider text is not valid JSON ({}), falling back to raw response", e);
                return ProviderPayload::Unparseable(text.to_string());
            }
        };

        if [COLOR_ANALYSIS, STYLE_GUIDE, CONVERSATION]
            .iter()
            .all(|key| object.contains_key(*key))
        {
            let skin_tone_analysis = object.remove(SKIN_TONE_ANALYSIS);
            let payload = SectionedPayload {
                color_analysis: take_section(&mut object, COLOR_ANALYSIS),
                style_guide: take_section(&mut object, STYLE_GUIDE),
                conversation: take_section(&mut object, CONVERSATION),
                skin_tone_analysis: skin_tone_analysis.clone(),
                rest: object,
            };
            return match skin_tone_analysis {
                Some(_) => ProviderPayload::SkinToneAware(payload),
                None => ProviderPayload::Sectioned(payload),
            };
        }

        if let Some(Value::Object(_)) = object.get(FULL_ANALYSIS) {
            let full_analysis = take_section(&mut object, FULL_ANALYSIS);
            return ProviderPayload::Wrapped {
                full_analysis,
                envelope: object,
            };
        }

        ProviderPayload::Flat(object)
    }

    pub fn shape_name(&self) -> &'static str {
        match self {
            ProviderPayload::SkinToneAware(_) => "skin-tone-aware",
            ProviderPayload::Sectioned(_) => "sectioned",
            ProviderPayload::Wrapped { .. } => "fullAnalysis-wrapped",
            ProviderPayload::Flat(_) => "legacy-flat",
            ProviderPayload::Unparseable(_) => "unparseable",
        }
    }

    pub fn into_analysis(self) -> NormalizedAnalysis {
        match self {
            ProviderPayload::SkinToneAware(payload) | ProviderPayload::Sectioned(payload) => {
                decode_fields(payload.into_fields())
            }
            ProviderPayload::Wrapped {
                mut full_analysis,
                mut envelope,
            } => {
                // Conversation hooks come from the envelope only; inner ones are ignored.
                for key in [OPENING_LINE, SUGGESTED_REPLIES] {
                    full_analysis.remove(key);
                    if let Some(value) = envelope.remove(key) {
                        full_analysis.insert(key.to_string(), value);
                    }
                }
                decode_fields(full_analysis)
            }
            ProviderPayload::Flat(fields) => decode_fields(fields),
            ProviderPayload::Unparseable(raw) => sentinel(&raw),
        }
    }
}

impl SectionedPayload {
    /// Merges the sections into one top-level field map. Sections win over stray top-level keys.
    fn into_fields(self) -> Map<String, Value> {
        let mut fields = self.rest;
        fields.extend(self.color_analysis);
        fields.extend(self.style_guide);
        fields.extend(self.conversation);

        match self.skin_tone_analysis {
            Some(skin_tone) => {
                fields.insert(SKIN_TONE_ANALYSIS.to_string(), skin_tone);
            }
            None => {
                fields.remove(SKIN_TONE_ANALYSIS);
            }
        }
        fields
    }
}

fn take_section(object: &mut Map<String, Value>, key: &str) -> Map<String, Value> {
    match object.remove(key) {
        Some(Value::Object(section)) => section,
        Some(other) => {
            warn!("Expected `{}` to be an object, got {}", key, other);
            Map::new()
        }
        None => Map::new(),
    }
}

/// Removes `key` and decodes it. A value of the wrong type is dropped on its own.
fn take<T: DeserializeOwned>(fields: &mut Map<String, Value>, key: &str) -> Option<T> {
    match fields.remove(key)? {
        Value::Null => None,
        value => match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("Dropping malformed `{}` field: {}", key, e);
                None
            }
        },
    }
}

/// Decodes an array field entry by entry. Malformed entries are dropped alone.
fn take_list<T: DeserializeOwned>(fields: &mut Map<String, Value>, key: &str) -> Vec<T> {
    match fields.remove(key) {
        Some(Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .filter_map(|(index, item)| match serde_json::from_value(item) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!("Dropping malformed `{}[{}]` entry: {}", key, index, e);
                    None
                }
            })
            .collect(),
        None | Some(Value::Null) => Vec::new(),
        Some(other) => {
            warn!("Expected `{}` to be an array, got {}", key, other);
            Vec::new()
        }
    }
}

/// Decodes an object field value by value. Malformed values are dropped alone.
fn take_map<T: DeserializeOwned>(
    fields: &mut Map<String, Value>,
    key: &str,
) -> Option<BTreeMap<String, T>> {
    match fields.remove(key)? {
        Value::Object(entries) => Some(
            entries
                .into_iter()
                .filter_map(|(name, value)| match serde_json::from_value(value) {
                    Ok(parsed) => Some((name, parsed)),
                    Err(e) => {
                        warn!("Dropping malformed `{}.{}` entry: {}", key, name, e);
                        None
                    }
                })
                .collect(),
        ),
        Value::Null => None,
        other => {
            warn!("Expected `{}` to be an object, got {}", key, other);
            None
        }
    }
}

fn decode_fields(mut fields: Map<String, Value>) -> NormalizedAnalysis {
    let mut suggested_replies: Vec<SuggestedReply> = take_list(&mut fields, SUGGESTED_REPLIES);
    if suggested_replies.is_empty() {
        suggested_replies = default_suggested_replies();
    }

    let mut analysis = NormalizedAnalysis {
        skin_tone_analysis: take(&mut fields, SKIN_TONE_ANALYSIS),
        image_palette: take_list(&mut fields, "imagePalette"),
        suggested_palettes: take_list(&mut fields, "suggestedPalettes"),
        color_psychology: take(&mut fields, "colorPsychology"),
        seasonal_fit: take(&mut fields, "seasonalFit"),
        suggestions_by_occasion: take_map(&mut fields, "suggestionsByOccasion"),
        dominant_colors: take_list(&mut fields, "dominantColors"),
        complementary_colors: take_list(&mut fields, "complementaryColors"),
        seasonal_recommendations: take(&mut fields, "seasonalRecommendations"),
        style_suggestions: take(&mut fields, "styleSuggestions"),
        opening_line: take::<String>(&mut fields, OPENING_LINE)
            .filter(|line| !line.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_OPENING_LINE.to_string()),
        suggested_replies,
        raw_response: take(&mut fields, "rawResponse"),
    };

    project_legacy_fields(&mut analysis);

    if !fields.is_empty() {
        debug!(
            "Ignoring unrecognized analysis keys: {:?}",
            fields.keys().collect::<Vec<_>>()
        );
    }
    analysis
}

/// Fills the legacy fields older clients render from the palette-based fields.
/// Values the provider supplied directly are never overwritten.
fn project_legacy_fields(analysis: &mut NormalizedAnalysis) {
    if analysis.dominant_colors.is_empty() {
        analysis.dominant_colors = analysis
            .image_palette
            .iter()
            .map(PaletteColor::label)
            .filter(|label| !label.is_empty())
            .map(str::to_string)
            .collect();
    }

    if analysis.complementary_colors.is_empty() {
        let mut names: Vec<String> = Vec::new();
        for color in analysis.suggested_palettes.iter().flat_map(|p| &p.colors) {
            let label = color.label();
            if !label.is_empty() && !names.iter().any(|n| n.eq_ignore_ascii_case(label)) {
                names.push(label.to_string());
            }
        }
        analysis.complementary_colors = names;
    }

    if analysis.seasonal_recommendations.is_none() {
        analysis.seasonal_recommendations = analysis
            .seasonal_fit
            .clone()
            .map(SeasonalRecommendations::Detailed);
    }

    if analysis
        .style_suggestions
        .as_ref()
        .is_none_or(StyleSuggestions::is_empty)
    {
        if let Some(occasions) = analysis
            .suggestions_by_occasion
            .as_ref()
            .filter(|o| !o.is_empty())
        {
            analysis.style_suggestions = Some(StyleSuggestions::List(
                occasions
                    .iter()
                    .map(|(occasion, suggestion)| format!("{}: {}", occasion, suggestion.text()))
                    .collect(),
            ));
        }
    }
}

/// Degraded record for provider text that could not be decoded.
pub fn sentinel(raw: &str) -> NormalizedAnalysis {
    NormalizedAnalysis {
        seasonal_recommendations: Some(SeasonalRecommendations::Summary(
            FALLBACK_SEASONAL_RECOMMENDATIONS.to_string(),
        )),
        style_suggestions: Some(StyleSuggestions::List(Vec::new())),
        color_psychology: Some(ColorPsychology::Summary(
            FALLBACK_COLOR_PSYCHOLOGY.to_string(),
        )),
        opening_line: DEFAULT_OPENING_LINE.to_string(),
        suggested_replies: default_suggested_replies(),
        raw_response: Some(raw.to_string()),
        ..NormalizedAnalysis::default()
    }
}

/// Maps provider text onto the canonical record. Never fails.
pub fn normalize_analysis(text: &str) -> NormalizedAnalysis {
    let payload = ProviderPayload::detect(text);
    info!("Normalizing {} analysis response", payload.shape_name());
    payload.into_analysis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn skin_tone_response() -> Value {
        json!({
            "skinToneAnalysis": {
                "detected": true,
                "undertone": "cool",
                "season": "winter",
                "confidence": "high",
                "reasoning": "Pink undertones visible in natural light"
            },
            "colorAnalysis": {
                "imagePalette": [
                    {"name": "navy", "hex": "#1e3a8a", "role": "base", "item": "blazer"},
                    {"name": "", "hex": "#fefce8", "role": "accent"}
                ],
                "suggestedPalettes": [
                    {"name": "Jewel", "description": "Deep tones", "colors": [
                        {"name": "emerald", "hex": "#059669"},
                        {"name": "sapphire", "hex": "#1d4ed8"}
                    ]},
                    {"name": "Soft", "description": "Muted", "colors": [
                        {"name": "Emerald", "hex": "#059669"},
                        {"name": "rose", "hex": "#fda4af"}
                    ]}
                ],
                "colorPsychology": {"emotionalImpact": "Calm", "socialPerception": "Trustworthy"}
            },
            "styleGuide": {
                "seasonalFit": {"bestSeasons": ["autumn", "winter"], "avoidSeasons": ["summer"], "rationale": "Deep colors"},
                "suggestionsByOccasion": {
                    "work": {"text": "Navy blazer with cream shell", "visuals": ["blazer", "loafers"]},
                    "casual": "Cream knit with dark denim"
                }
            },
            "conversation": {
                "openingLine": "Navy looks sharp on you! Where are you headed?",
                "suggestedReplies": ["Work", {"text": "Shop the look", "action": "shop"}]
            }
        })
    }

    #[test]
    fn strips_fences_with_and_without_language_tags() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("Here you go:\n```\n{\"a\":1}\n```\nEnjoy"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn detects_each_known_shape() {
        let skin = skin_tone_response();
        assert!(matches!(
            ProviderPayload::detect(&skin.to_string()),
            ProviderPayload::SkinToneAware(_)
        ));

        let mut sectioned = skin.clone();
        sectioned.as_object_mut().unwrap().remove("skinToneAnalysis");
        assert!(matches!(
            ProviderPayload::detect(&sectioned.to_string()),
            ProviderPayload::Sectioned(_)
        ));

        let wrapped = json!({"fullAnalysis": {"dominantColors": ["red"]}});
        assert!(matches!(
            ProviderPayload::detect(&wrapped.to_string()),
            ProviderPayload::Wrapped { .. }
        ));

        // A string-valued fullAnalysis is not the wrapped shape.
        let not_wrapped = json!({"fullAnalysis": "text", "dominantColors": ["red"]});
        assert!(matches!(
            ProviderPayload::detect(&not_wrapped.to_string()),
            ProviderPayload::Flat(_)
        ));

        assert!(matches!(
            ProviderPayload::detect("[1, 2]"),
            ProviderPayload::Unparseable(_)
        ));
    }

    #[test]
    fn skin_tone_shape_unwraps_into_superset_with_legacy_projection() {
        let analysis = normalize_analysis(&format!("```json\n{}\n```", skin_tone_response()));

        let skin = analysis.skin_tone_analysis.as_ref().unwrap();
        assert!(skin.detected);
        assert_eq!(skin.undertone.as_deref(), Some("cool"));
        assert_eq!(skin.season.as_deref(), Some("winter"));

        assert_eq!(analysis.image_palette.len(), 2);
        assert_eq!(analysis.image_palette[0].item.as_deref(), Some("blazer"));
        assert_eq!(analysis.suggested_palettes.len(), 2);
        assert!(matches!(analysis.color_psychology, Some(ColorPsychology::Detailed(_))));
        assert_eq!(
            analysis.seasonal_fit.as_ref().unwrap().best_seasons,
            vec!["autumn", "winter"]
        );
        let occasions = analysis.suggestions_by_occasion.as_ref().unwrap();
        assert_eq!(
            occasions["work"],
            OccasionSuggestion::Detailed {
                text: "Navy blazer with cream shell".to_string(),
                visuals: vec!["blazer".to_string(), "loafers".to_string()],
            }
        );

        assert_eq!(analysis.opening_line, "Navy looks sharp on you! Where are you headed?");
        assert_eq!(analysis.suggested_replies[1].action.as_deref(), Some("shop"));
        assert!(analysis.raw_response.is_none());

        // Legacy projection
        assert_eq!(analysis.dominant_colors, vec!["navy", "#fefce8"]);
        assert_eq!(analysis.complementary_colors, vec!["emerald", "sapphire", "rose"]);
        assert_eq!(
            analysis.seasonal_recommendations,
            Some(SeasonalRecommendations::Detailed(analysis.seasonal_fit.clone().unwrap()))
        );
        assert_eq!(
            analysis.style_suggestions,
            Some(StyleSuggestions::List(vec![
                "casual: Cream knit with dark denim".to_string(),
                "work: Navy blazer with cream shell".to_string(),
            ]))
        );
    }

    #[test]
    fn sectioned_shape_omits_skin_tone() {
        let mut response = skin_tone_response();
        let object = response.as_object_mut().unwrap();
        object.remove("skinToneAnalysis");
        // A stray nested copy is not picked up either.
        object["colorAnalysis"]["skinToneAnalysis"] = json!({"detected": true});

        let analysis = normalize_analysis(&response.to_string());
        assert!(analysis.skin_tone_analysis.is_none());
        assert_eq!(analysis.dominant_colors, vec!["navy", "#fefce8"]);
        assert_eq!(analysis.suggested_replies.len(), 2);
    }

    #[test]
    fn wrapped_shape_merges_envelope_fields() {
        let response = json!({
            "fullAnalysis": {
                "dominantColors": ["burgundy"],
                "complementaryColors": ["gold"],
                "seasonalRecommendations": "Autumn and winter",
                "styleSuggestions": ["Add gold jewelry"],
                "colorPsychology": "Confident",
                "openingLine": "inner line"
            },
            "openingLine": "Burgundy is bold! What's the occasion?",
            "suggestedReplies": ["A formal event"]
        });

        let analysis = normalize_analysis(&response.to_string());
        assert_eq!(analysis.dominant_colors, vec!["burgundy"]);
        assert_eq!(analysis.complementary_colors, vec!["gold"]);
        assert_eq!(
            analysis.seasonal_recommendations,
            Some(SeasonalRecommendations::Summary("Autumn and winter".to_string()))
        );
        assert_eq!(analysis.opening_line, "Burgundy is bold! What's the occasion?");
        assert_eq!(analysis.suggested_replies, vec![SuggestedReply::from("A formal event")]);
    }

    #[test]
    fn wrapped_shape_without_envelope_gets_defaults() {
        let analysis = normalize_analysis(&json!({"fullAnalysis": {"dominantColors": ["teal"]}}).to_string());
        assert_eq!(analysis.dominant_colors, vec!["teal"]);
        assert_eq!(analysis.opening_line, DEFAULT_OPENING_LINE);
        assert_eq!(analysis.suggested_replies, default_suggested_replies());

        let inner_only = normalize_analysis(
            &json!({"fullAnalysis": {
                "dominantColors": ["teal"],
                "openingLine": "inner",
                "suggestedReplies": ["inner reply"]
            }})
            .to_string(),
        );
        assert_eq!(inner_only.opening_line, DEFAULT_OPENING_LINE);
        assert_eq!(inner_only.suggested_replies, default_suggested_replies());
    }

    #[test]
    fn one_bad_entry_does_not_empty_its_collection() {
        let response = json!({
            "suggestionsByOccasion": {
                "work": {"text": "Navy blazer", "visuals": ["blazer"]},
                "party": {"visuals": ["heels"]}
            },
            "imagePalette": [
                {"name": "navy", "hex": "#000"},
                {"name": "cream", "hex": null},
                42
            ],
            "suggestedReplies": ["Show me shoes", 7]
        });
        let analysis = normalize_analysis(&response.to_string());

        let occasions = analysis.suggestions_by_occasion.as_ref().unwrap();
        assert_eq!(occasions.len(), 1);
        assert_eq!(occasions["work"].text(), "Navy blazer");

        assert_eq!(analysis.image_palette.len(), 2);
        assert_eq!(analysis.image_palette[1].hex, "");
        assert_eq!(analysis.dominant_colors, vec!["navy", "cream"]);
        assert_eq!(
            analysis.style_suggestions,
            Some(StyleSuggestions::List(vec!["work: Navy blazer".to_string()]))
        );
        assert_eq!(analysis.suggested_replies, vec![SuggestedReply::from("Show me shoes")]);
    }

    #[test]
    fn legacy_flat_example_gets_default_conversation_hooks() {
        let text = "```json\n{\"dominantColors\":[\"navy\",\"cream\"],\"complementaryColors\":[\"beige\"],\"seasonalRecommendations\":\"works well in fall\",\"styleSuggestions\":[\"pair with boots\"],\"colorPsychology\":\"calm\"}\n```";
        let analysis = normalize_analysis(text);

        assert_eq!(analysis.dominant_colors, vec!["navy", "cream"]);
        assert_eq!(analysis.complementary_colors, vec!["beige"]);
        assert_eq!(
            analysis.seasonal_recommendations,
            Some(SeasonalRecommendations::Summary("works well in fall".to_string()))
        );
        assert_eq!(
            analysis.style_suggestions,
            Some(StyleSuggestions::List(vec!["pair with boots".to_string()]))
        );
        assert_eq!(
            analysis.color_psychology,
            Some(ColorPsychology::Summary("calm".to_string()))
        );
        assert_eq!(analysis.opening_line, DEFAULT_OPENING_LINE);
        assert_eq!(analysis.suggested_replies, default_suggested_replies());
        assert!(analysis.raw_response.is_none());
    }

    #[test]
    fn malformed_text_yields_sentinel_with_raw_response() {
        for text in [
            "I love this outfit! The navy works beautifully.",
            "```json\n{\"dominantColors\": [\"navy\",\n```",
            "{\"dominantColors\": [\"navy\"",
            "\"just a string\"",
        ] {
            let analysis = normalize_analysis(text);
            assert_eq!(analysis.raw_response.as_deref(), Some(text));
            assert!(analysis.dominant_colors.is_empty());
            assert!(analysis.complementary_colors.is_empty());
            assert_eq!(
                analysis.seasonal_recommendations,
                Some(SeasonalRecommendations::Summary("Analysis completed".to_string()))
            );
            assert_eq!(
                analysis.color_psychology,
                Some(ColorPsychology::Summary("Color analysis provided".to_string()))
            );
            assert_eq!(analysis.opening_line, DEFAULT_OPENING_LINE);
            assert_eq!(analysis.suggested_replies, default_suggested_replies());
        }
    }

    #[test]
    fn a_malformed_field_does_not_hide_its_siblings() {
        let response = json!({
            "dominantColors": "navy",
            "complementaryColors": ["beige"],
            "imagePalette": [{"name": "navy", "hex": 12}],
            "colorPsychology": "calm"
        });

        let analysis = normalize_analysis(&response.to_string());
        assert!(analysis.image_palette.is_empty());
        assert!(analysis.dominant_colors.is_empty());
        assert_eq!(analysis.complementary_colors, vec!["beige"]);
        assert_eq!(
            analysis.color_psychology,
            Some(ColorPsychology::Summary("calm".to_string()))
        );
        assert!(analysis.raw_response.is_none());
    }

    #[test]
    fn canonical_record_survives_re_normalization() {
        let first = normalize_analysis(&skin_tone_response().to_string());
        let reserialized = serde_json::to_string(&first).unwrap();
        let second = normalize_analysis(&reserialized);
        assert_eq!(first, second);

        let fallback = normalize_analysis("not json");
        let again = normalize_analysis(&serde_json::to_string(&fallback).unwrap());
        assert_eq!(fallback, again);
    }
}
