//! Prompt and response handling for theme/emotion classification.

use livlib_core::{Classification, Error, Result};

/// Maximum themes or emotions kept from a classifier response.
pub const MAX_LABELS: usize = 5;

/// System prompt asking for a strict JSON object.
pub const CLASSIFY_SYSTEM_PROMPT: &str = "You read short personal journal entries and label them. \
Respond with a JSON object of the form {\"themes\": [...], \"emotions\": [...]}. \
Themes are short Title Case topics such as \"Family\", \"Career\" or \"Loss\", most dominant first. \
Emotions are single Title Case words such as \"Joy\" or \"Grief\". \
Return at most 5 of each and nothing besides the JSON object.";

/// Parse a classifier reply into a normalized [`Classification`].
///
/// Tolerates markdown code fences and prose around the JSON object.
pub fn parse_classification(content: &str) -> Result<Classification> {
    let start = content.find('{');
    let end = content.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &content[s..=e],
        _ => {
            return Err(Error::ProviderUnavailable(
                "classifier reply contained no JSON object".to_string(),
            ))
        }
    };

    let parsed: Classification = serde_json::from_str(json).map_err(|e| {
        Error::ProviderUnavailable(format!("classifier reply was not valid JSON: {}", e))
    })?;

    let mut normalized = parsed.normalized();
    normalized.themes.truncate(MAX_LABELS);
    normalized.emotions.truncate(MAX_LABELS);
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let c = parse_classification(r#"{"themes": ["Family", "Loss"], "emotions": ["Grief"]}"#)
            .unwrap();
        assert_eq!(c.themes, vec!["Family", "Loss"]);
        assert_eq!(c.emotions, vec!["Grief"]);
    }

    #[test]
    fn test_parse_fenced_json() {
        let reply = "```json\n{\"themes\": [\"Career\"], \"emotions\": []}\n```";
        let c = parse_classification(reply).unwrap();
        assert_eq!(c.themes, vec!["Career"]);
        assert!(c.emotions.is_empty());
    }

    #[test]
    fn test_parse_missing_keys_default_empty() {
        let c = parse_classification("{}").unwrap();
        assert!(c.themes.is_empty());
        assert!(c.emotions.is_empty());
    }

    #[test]
    fn test_parse_dedups_and_caps() {
        let reply = r#"{"themes": ["A", "a", "B", "C", "D", "E", "F", "G"], "emotions": []}"#;
        let c = parse_classification(reply).unwrap();
        assert_eq!(c.themes, vec!["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn test_parse_rejects_non_json() {
        let err = parse_classification("I think this is about family.").unwrap_err();
        assert!(matches!(err, Error::ProviderUnavailable(_)));
    }
}
