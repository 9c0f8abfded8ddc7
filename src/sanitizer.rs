// Output Sanitizer - Turn raw model samples into story text
//
// Trims to the last complete sentence, cleans markup left over from the
// training data, optionally censors profanity and keeps the casing of the
// first letter the model produced.

use std::borrow::Cow;

use crate::censor::ProfanityFilter;
use crate::sentence::cut_trailing_sentence;

/// Cleans raw decoded output
#[derive(Debug, Clone, Default)]
pub struct OutputSanitizer {
    censor: Option<Cow<'static, ProfanityFilter>>,
}

impl OutputSanitizer {
    /// Sanitizer with censoring turned on or off
    ///
    /// Censoring borrows the shared bundled filter, so building one per
    /// request does not copy the word list.
    pub fn new(censor: bool) -> Self {
        Self {
            censor: censor.then(|| Cow::Borrowed(ProfanityFilter::shared())),
        }
    }

    /// Sanitizer censoring with a custom filter
    pub fn with_filter(filter: ProfanityFilter) -> Self {
        Self {
            censor: Some(Cow::Owned(filter)),
        }
    }

    /// Filter used for censoring, if any
    pub fn filter(&self) -> Option<&ProfanityFilter> {
        self.censor.as_deref()
    }

    pub fn censors(&self) -> bool {
        self.censor.is_some()
    }

    /// Sanitize one raw sample, returning "" when nothing usable is left
    pub fn sanitize(&self, raw: &str) -> String {
        let trimmed = cut_trailing_sentence(raw);
        let Some(first) = trimmed.chars().next() else {
            return String::new();
        };
        let first_letter_capitalized = first.is_uppercase();

        let mut result = trimmed
            .replace(".\"", "\".")
            .replace(['#', '*'], "")
            .replace("\n\n", "\n");

        if let Some(filter) = self.filter() {
            result = filter.censor(&result);
        }

        if !first_letter_capitalized {
            result = lowercase_first(&result);
        }

        result
    }
}

/// Sanitize with the bundled profanity list when `censor` is set
pub fn result_replace(raw: &str, censor: bool) -> String {
    OutputSanitizer::new(censor).sanitize(raw)
}

fn lowercase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
