// Sentence Trimmer - Cut model output back to its last complete sentence
//
// GPT-2 stops after a fixed token budget, usually mid-sentence. The
// continuation is trimmed to the last terminator, and anything the model
// wrote past an end-of-text marker ('<') or a new player action ('>') is
// dropped along with unbalanced quotes and dangling dialogue prompts.

/// Phrases that mark a trailing line as the start of a player action
const TRAILING_ACTION_PHRASES: &[&str] = &["you ask", "You ask", "you say", "You say"];

fn is_sentence_terminator(ch: char) -> bool {
    matches!(ch, '.' | '!' | '?')
}

/// Replace typographic quotes and backticks with their ASCII forms
pub fn standardize_punctuation(text: &str) -> String {
    text.chars()
        .map(|ch| match ch {
            '\u{2019}' | '`' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            other => other,
        })
        .collect()
}

/// Trim text to its last complete sentence
///
/// Text with no terminator past its first character is kept whole, then
/// still cut at the first `<` or `>` and cleaned of trailing quotes and
/// actions.
pub fn cut_trailing_sentence(text: &str) -> String {
    let text = standardize_punctuation(text);

    // All markers are ASCII, so byte offsets are valid slice boundaries.
    let mut end = match text.rfind(is_sentence_terminator) {
        Some(index) if index > 0 => index + 1,
        _ => text.len(),
    };

    for marker in ['<', '>'] {
        if let Some(index) = text.find(marker) {
            if index > 0 {
                end = end.min(index);
            }
        }
    }

    let trimmed = cut_trailing_quotes(&text[..end]);
    cut_trailing_action(trimmed).to_string()
}

/// Drop everything from the last `"` when quotes are unbalanced
pub fn cut_trailing_quotes(text: &str) -> &str {
    if text.matches('"').count() % 2 == 0 {
        return text;
    }
    match text.rfind('"') {
        Some(index) => &text[..index],
        None => text,
    }
}

/// Drop a trailing line that starts the player's dialogue
pub fn cut_trailing_action(text: &str) -> &str {
    let Some((head, last_line)) = text.rsplit_once('\n') else {
        return text;
    };

    if TRAILING_ACTION_PHRASES
        .iter()
        .any(|phrase| last_line.contains(phrase))
    {
        head
    } else {
        text
    }
}

/// Check whether text ends right after a sentence terminator
#[cfg(test)]
pub(crate) fn ends_with_complete_sentence(text: &str) -> bool {
    text.chars().last().is_some_and(is_sentence_terminator)
}
