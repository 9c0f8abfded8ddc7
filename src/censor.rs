// Profanity Filter - Word-list based censoring of story output
//
// Loads the bundled censored word list and masks matching words with
// asterisks, one per character, so the text keeps its shape. Plural and
// possessive forms of a listed word are masked as well.

use std::collections::HashSet;

use lazy_static::lazy_static;

/// Character used to mask censored words
pub const CENSOR_CHAR: char = '*';

const CENSORED_WORDS: &str = include_str!("../wordlists/censored_words.txt");

lazy_static! {
    static ref DEFAULT_FILTER: ProfanityFilter = ProfanityFilter::from_wordlist(CENSORED_WORDS);
}

/// Suffixes stripped to find the listed stem of a plural
const PLURAL_SUFFIXES: [&str; 2] = ["s", "es"];

/// Case-insensitive whole-word censor
#[derive(Debug, Clone, Default)]
pub struct ProfanityFilter {
    words: HashSet<String>,
}

impl ProfanityFilter {
    /// Filter loaded with the bundled word list
    ///
    /// Returns an owned copy for callers that add custom words; use
    /// [`ProfanityFilter::shared`] to censor with the bundled list as-is.
    pub fn new() -> Self {
        DEFAULT_FILTER.clone()
    }

    /// The process-wide filter built from the bundled word list
    pub fn shared() -> &'static ProfanityFilter {
        &DEFAULT_FILTER
    }

    /// Parse a word list, one word per line
    ///
    /// Empty lines and lines starting with '#' are skipped.
    pub fn from_wordlist(text: &str) -> Self {
        let words = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_lowercase)
            .collect();
        Self { words }
    }

    /// Add extra words on top of the loaded list
    pub fn with_custom_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.words.extend(
            words
                .into_iter()
                .map(|w| w.as_ref().trim().to_lowercase())
                .filter(|w| !w.is_empty()),
        );
        self
    }

    /// Number of censored words
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Check a single word against the list
    ///
    /// A possessive `'s` is ignored, and a word ending in `s` or `es`
    /// matches when its stem is listed ("bastards", "bitch's").
    pub fn is_profane(&self, word: &str) -> bool {
        let lower = word.to_lowercase();
        let base = lower.strip_suffix("'s").unwrap_or(&lower);

        self.words.contains(base)
            || PLURAL_SUFFIXES
                .iter()
                .filter_map(|suffix| base.strip_suffix(suffix))
                .any(|stem| self.words.contains(stem))
    }

    /// Mask every censored word in the text
    pub fn censor(&self, text: &str) -> String {
        let mut censored = String::with_capacity(text.len());
        let mut word = String::new();

        for ch in text.chars() {
            // Apostrophes stay inside a word ("damn't"), but never start one
            if ch.is_alphanumeric() || (ch == '\'' && !word.is_empty()) {
                word.push(ch);
            } else {
                self.flush_word(&mut word, &mut censored);
                censored.push(ch);
            }
        }
        self.flush_word(&mut word, &mut censored);

        censored
    }

    fn flush_word(&self, word: &mut String, out: &mut String) {
        if word.is_empty() {
            return;
        }

        // A trailing apostrophe is punctuation, not part of the word
        let trailing = word.len() - word.trim_end_matches('\'').len();
        let core = &word[..word.len() - trailing];

        if self.is_profane(core) {
            out.extend(std::iter::repeat(CENSOR_CHAR).take(core.chars().count()));
        } else {
            out.push_str(core);
        }
        out.extend(std::iter::repeat('\'').take(trailing));
        word.clear();
    }
}

/// Censor text with the bundled word list
pub fn remove_profanity(text: &str) -> String {
    DEFAULT_FILTER.censor(text)
}
