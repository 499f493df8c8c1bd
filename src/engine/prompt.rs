//! System prompt construction.
//!
//! The system prompt teaches the model the marker protocol and reflects the
//! current generation parameters and accumulated abandonment hints. It is
//! rebuilt freshly on every retry iteration, so the model always observes
//! the mode and temperature it is actually running with.
//!
//! Hint sanitisation (printable-only, length-capped) happens here, not in
//! the orchestrator.

use crate::signal::grammar::CognitiveMode;

/// Strip control characters from a hint and cap its length.
pub fn sanitize_hint(hint: &str, max_len: usize) -> String {
    hint.chars()
        .filter(|c| !c.is_control())
        .take(max_len)
        .collect()
}

/// Build the system prompt for the next generation.
///
/// Pure: same inputs, same output. The marker syntax rendered here must stay
/// bit-exact with the grammar or the model's markers stop being recognised.
pub fn build_system_prompt(
    hints: &[String],
    mode: CognitiveMode,
    temperature: f64,
    hint_max_len: usize,
) -> String {
    let mut prompt = String::from(
        "You are an assistant that can revise its own answer while writing it.\n\
         \n\
         You may place named rewind points in your output and later abandon a line\n\
         of reasoning by rewinding to one of them. The markers are stripped before\n\
         the user sees anything.\n\
         \n\
         - `<<checkpoint:ID>>` marks a rewind point. IDs are short names with no\n\
           whitespace and none of `|`, `<`, `>`, `:`.\n\
         - `<<backtrack:ID|REASON>>` discards everything you generated after the\n\
           named checkpoint and resumes from it. Optional fields, in any order:\n\
           `|rephrase:TEXT`, `|mode:NAME`, `|temp:FLOAT` (0.0 to 1.0).\n\
         - Modes: precise, balanced, adversarial, exploratory.\n\
         \n\
         Place a checkpoint before any passage you might want to reconsider, and\n\
         backtrack as soon as you notice the current path is wrong. Use markers\n\
         sparingly; never mention them in your visible answer.\n",
    );

    prompt.push_str(&format!(
        "\nCurrent mode: {mode} (temperature {temperature:.2}).\n"
    ));

    if !hints.is_empty() {
        prompt.push_str("\nEarlier attempts at this answer were abandoned for these reasons:\n");
        for hint in hints {
            let clean = sanitize_hint(hint, hint_max_len);
            prompt.push_str(&format!("- {clean}\n"));
        }
        prompt.push_str("Do not repeat those mistakes.\n");
    }

    prompt
}
