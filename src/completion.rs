//! Helpers for turning model completions into structured values.

use serde::de::DeserializeOwned;

/// Extract JSON from a completion string, handling markdown code blocks.
///
/// Attempts extraction in this order:
/// 1. Raw JSON (object or array)
/// 2. A ```json fenced block
/// 3. Any ``` fenced block
pub fn extract_json_from_completion(completion: &str) -> Result<&str, String> {
    let trimmed = completion.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(trimmed);
    }

    if completion.contains("```json") {
        return completion
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ```json block but content was empty or malformed".to_string());
    }

    if completion.contains("```") {
        return completion
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ``` block but content was empty or malformed".to_string());
    }

    Err(format!(
        "No JSON found in response. First 100 chars: '{}'",
        preview(completion, 100)
    ))
}

/// Extract and deserialize a JSON payload from a completion.
pub fn parse_completion<T: DeserializeOwned>(completion: &str) -> Result<T, String> {
    let json = extract_json_from_completion(completion)?;
    serde_json::from_str(json).map_err(|e| e.to_string())
}

/// First `max_chars` characters of `text`, for log fields.
pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        value: u32,
    }

    #[test]
    fn test_extract_raw_json() {
        assert_eq!(
            extract_json_from_completion("  {\"value\": 1}  ").unwrap(),
            "{\"value\": 1}"
        );
        assert_eq!(extract_json_from_completion("[1, 2]").unwrap(), "[1, 2]");
    }

    #[test]
    fn test_extract_json_fence() {
        let completion = "Here you go:\n```json\n{\"value\": 2}\n```\nDone.";
        assert_eq!(
            extract_json_from_completion(completion).unwrap(),
            "{\"value\": 2}"
        );
    }

    #[test]
    fn test_extract_plain_fence() {
        let completion = "```\n{\"value\": 3}\n```";
        assert_eq!(
            extract_json_from_completion(completion).unwrap(),
            "{\"value\": 3}"
        );
    }

    #[test]
    fn test_extract_empty_fence_is_error() {
        assert!(extract_json_from_completion("```json\n```").is_err());
    }

    #[test]
    fn test_extract_no_json() {
        let err = extract_json_from_completion("just prose").unwrap_err();
        assert!(err.contains("No JSON found"));
        assert!(err.contains("just prose"));
    }

    #[test]
    fn test_parse_completion() {
        let parsed: Sample = parse_completion("```json\n{\"value\": 7}\n```").unwrap();
        assert_eq!(parsed, Sample { value: 7 });
        assert!(parse_completion::<Sample>("{\"other\": 1}").is_err());
    }

    #[test]
    fn test_preview_is_char_safe() {
        assert_eq!(preview("héllo wörld", 4), "héll");
        assert_eq!(preview("ab", 10), "ab");
    }
}
