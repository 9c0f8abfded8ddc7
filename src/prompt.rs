// Prompt Preparer - Fit story transcripts into the model's prompt budget
//
// Story transcripts mark each player action with '>'. When a transcript
// grows past the budget, the oldest action after the opening text is
// dropped, keeping the story's opening and the most recent turns.

/// Maximum prompt length in characters before truncation kicks in
pub const MAX_PROMPT_CHARS: usize = 3500;

/// Delimiter that starts a player action in the transcript
pub const ACTION_DELIMITER: char = '>';

/// Remove a single trailing space, if present
pub fn prompt_replace(prompt: &str) -> &str {
    prompt.strip_suffix(' ').unwrap_or(prompt)
}

/// Drop the second '>'-delimited segment of the prompt
///
/// `"intro>first>second>third"` becomes `"intro>second>third"`.
/// Prompts with fewer than two delimiters are returned unchanged.
pub fn cut_down_prompt(prompt: &str) -> String {
    let mut segments = prompt.splitn(3, ACTION_DELIMITER);
    let (Some(head), Some(_dropped), Some(rest)) =
        (segments.next(), segments.next(), segments.next())
    else {
        return prompt.to_string();
    };

    let mut cut = String::with_capacity(head.len() + rest.len() + 1);
    cut.push_str(head);
    cut.push(ACTION_DELIMITER);
    cut.push_str(rest);
    cut
}

/// Shorten the prompt until it fits in `MAX_PROMPT_CHARS`
///
/// Stops early when a cut makes no progress, so a long prompt without
/// enough delimiters is returned as-is rather than looping forever.
pub fn fit_prompt(prompt: &str) -> String {
    let mut fitted = prompt.to_string();
    let mut length = fitted.chars().count();

    while length > MAX_PROMPT_CHARS {
        let cut = cut_down_prompt(&fitted);
        let cut_length = cut.chars().count();
        if cut_length >= length {
            tracing::warn!(
                "Prompt: {} chars over budget but no action left to drop",
                length
            );
            break;
        }
        fitted = cut;
        length = cut_length;
    }

    fitted
}

/// Strip the trailing space and fit the prompt into the budget
pub fn prepare_prompt(prompt: &str) -> String {
    fit_prompt(prompt_replace(prompt))
}
