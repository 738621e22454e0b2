/// How a new batch of OCR results combines with the text already held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregateMode {
    /// Discard the previous text; the new batch stands alone.
    #[default]
    Replace,
    /// Keep the current text and add the new batch after it.
    Append,
}

impl AggregateMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "" | "replace" => Some(AggregateMode::Replace),
            "append" | "merge" => Some(AggregateMode::Append),
            _ => None,
        }
    }
}

/// Joins non-empty texts with `\n`, keeping input order.
pub fn aggregate<S: AsRef<str>>(texts: &[S]) -> String {
    texts
        .iter()
        .map(AsRef::as_ref)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text currently shown to the user: the aggregated OCR result, unless the
/// user has typed over it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextDraft {
    aggregated: String,
    edited: Option<String>,
}

impl TextDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &str {
        self.edited.as_deref().unwrap_or(&self.aggregated)
    }

    pub fn aggregated(&self) -> &str {
        &self.aggregated
    }

    pub fn is_edited(&self) -> bool {
        self.edited.is_some()
    }

    /// Records a user edit. It wins over any aggregated text until the next
    /// batch or [`TextDraft::clear`].
    pub fn edit(&mut self, text: impl Into<String>) {
        self.edited = Some(text.into());
    }

    pub fn apply_batch<S: AsRef<str>>(&mut self, texts: &[S], mode: AggregateMode) {
        let batch = aggregate(texts);
        self.aggregated = match mode {
            AggregateMode::Replace => batch,
            AggregateMode::Append => aggregate(&[self.current(), batch.as_str()]),
        };
        self.edited = None;
    }

    pub fn clear(&mut self) {
        self.aggregated.clear();
        self.edited = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_in_input_order() {
        assert_eq!(aggregate(&["甲", "乙"]), "甲\n乙");
    }

    #[test]
    fn skips_empty_results() {
        assert_eq!(aggregate(&["", "first", "", "second", ""]), "first\nsecond");
    }

    #[test]
    fn empty_sequence_is_empty_text() {
        let empty: [&str; 0] = [];
        assert_eq!(aggregate(&empty), "");
        assert_eq!(aggregate(&["", ""]), "");
    }

    #[test]
    fn user_edit_takes_precedence() {
        let mut draft = TextDraft::new();
        draft.apply_batch(&["甲", "乙"], AggregateMode::Replace);
        assert_eq!(draft.current(), "甲\n乙");

        draft.edit("typed by hand");
        assert_eq!(draft.current(), "typed by hand");
        assert_eq!(draft.aggregated(), "甲\n乙");
        assert!(draft.is_edited());
    }

    #[test]
    fn replace_discards_previous_batch_and_edit() {
        let mut draft = TextDraft::new();
        draft.apply_batch(&["old"], AggregateMode::Replace);
        draft.edit("edited");
        draft.apply_batch(&["new"], AggregateMode::Replace);
        assert_eq!(draft.current(), "new");
        assert!(!draft.is_edited());
    }

    #[test]
    fn append_keeps_current_text_including_edit() {
        let mut draft = TextDraft::new();
        draft.apply_batch(&["甲"], AggregateMode::Replace);
        draft.edit("甲!");
        draft.apply_batch(&["乙", ""], AggregateMode::Append);
        assert_eq!(draft.current(), "甲!\n乙");
    }

    #[test]
    fn append_to_empty_draft() {
        let mut draft = TextDraft::new();
        draft.apply_batch(&["only"], AggregateMode::Append);
        assert_eq!(draft.current(), "only");
    }

    #[test]
    fn parses_modes() {
        assert_eq!(AggregateMode::parse("merge"), Some(AggregateMode::Append));
        assert_eq!(AggregateMode::parse(""), Some(AggregateMode::Replace));
        assert_eq!(AggregateMode::parse("other"), None);
    }
}
