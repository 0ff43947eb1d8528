use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

/// Pull the outermost `{ ... }` out of an LLM reply (prose and code fences
/// around it are ignored) and parse it. Broken JSON is reported, not repaired.
pub fn extract_json_object(reply: &str) -> Result<serde_json::Value> {
    let start = reply.find('{').context("No JSON object found in LLM response")?;
    let end = reply
        .rfind('}')
        .filter(|end| *end > start)
        .context("Unterminated JSON object in LLM response")?;

    let value: serde_json::Value = serde_json::from_str(&reply[start..=end])
        .context("LLM response contains invalid JSON")?;
    if !value.is_object() {
        anyhow::bail!("LLM response JSON is not an object");
    }
    Ok(value)
}

/// [`extract_json_object`] then deserialize into `T`.
pub fn parse_json_reply<T: DeserializeOwned>(reply: &str) -> Result<T> {
    let value = extract_json_object(reply)?;
    serde_json::from_value(value).context("LLM response JSON has an unexpected shape")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_object() {
        let v = extract_json_object(r#"{"a": 1}"#).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn test_object_in_code_fence_with_prose() {
        let reply = "Here is the plan:\n```json\n{\"file_type\": \"screen\", \"nested\": {\"x\": [1, 2]}}\n```\nGood luck!";
        let v = extract_json_object(reply).unwrap();
        assert_eq!(v["file_type"], "screen");
        assert_eq!(v["nested"]["x"][1], 2);
    }

    #[test]
    fn test_no_object() {
        let err = extract_json_object("I cannot help with that.").unwrap_err();
        assert!(err.to_string().contains("No JSON object"));
    }

    #[test]
    fn test_broken_json_is_an_error() {
        let err = extract_json_object("{\"a\": 1,,}").unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[test]
    fn test_reversed_braces() {
        assert!(extract_json_object("} nothing {").is_err());
    }

    #[test]
    fn test_parse_json_reply_typed() {
        #[derive(serde::Deserialize)]
        struct Shape {
            name: String,
        }
        let s: Shape = parse_json_reply("```{\"name\": \"x\"}```").unwrap();
        assert_eq!(s.name, "x");
    }
}
