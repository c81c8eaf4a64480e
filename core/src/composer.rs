//! Message draft with the contract's length limit applied at edit time.

/// Longest message the contract accepts, in UTF-16 code units.
pub const MAX_MESSAGE_UNITS: usize = 280;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    text: String,
    max_units: usize,
}

/// Result of an edit: whether input was cut to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditOutcome {
    pub units: usize,
    pub truncated: bool,
}

/// Cut `text` to at most `max_units` UTF-16 code units without splitting a character.
#[must_use]
pub fn truncate_units(text: &str, max_units: usize) -> &str {
    let mut used = 0;
    for (offset, ch) in text.char_indices() {
        used += ch.len_utf16();
        if used > max_units {
            return &text[..offset];
        }
    }
    text
}

#[must_use]
pub fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

impl Draft {
    pub fn new(max_units: usize) -> Self {
        Self {
            text: String::new(),
            max_units,
        }
    }

    /// Replace the draft, truncating to the limit.
    pub fn set(&mut self, text: &str) -> EditOutcome {
        let kept = truncate_units(text, self.max_units);
        let truncated = kept.len() < text.len();
        self.text = kept.to_string();
        EditOutcome {
            units: utf16_len(&self.text),
            truncated,
        }
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn units(&self) -> usize {
        utf16_len(&self.text)
    }

    pub fn max_units(&self) -> usize {
        self.max_units
    }

    /// Trimmed text, if there is anything to post.
    pub fn submittable(&self) -> Option<&str> {
        let trimmed = self.text.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}
