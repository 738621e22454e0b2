use crate::error::PipelineError;

/// Appended to every image prompt: polish the content and layout lightly, draw
/// only an illustration, no lettering.
pub const PROMPT_SUFFIX: &str =
    "以上內容幫我稍做修飾與排版，只需要圖，不需要文字，純粹插畫即可";

pub fn build_prompt(text: &str) -> String {
    let mut prompt = String::with_capacity(text.len() + PROMPT_SUFFIX.len());
    prompt.push_str(text);
    prompt.push_str(PROMPT_SUFFIX);
    prompt
}

/// Rejects empty or whitespace-only text before any external call.
pub fn require_text<'a>(
    text: &'a str,
    operation: &'static str,
) -> Result<&'a str, PipelineError> {
    if text.trim().is_empty() {
        return Err(PipelineError::EmptyInput { operation });
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_suffix_only() {
        assert_eq!(build_prompt(""), PROMPT_SUFFIX);
    }

    #[test]
    fn text_precedes_suffix() {
        assert_eq!(build_prompt("hello"), format!("hello{}", PROMPT_SUFFIX));
    }

    #[test]
    fn whitespace_only_text_is_rejected() {
        let err = require_text(" \n\t", "image").unwrap_err();
        assert!(matches!(err, PipelineError::EmptyInput { operation: "image" }));
        assert_eq!(require_text(" a ", "image").unwrap(), " a ");
    }
}
