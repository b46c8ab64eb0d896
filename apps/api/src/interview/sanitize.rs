use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // "1. ", "(2) ", "3: ", "4- ", "- ", "* ", "• "
    static ref LIST_MARKER: Regex =
        Regex::new(r"^\s*(?:\(?\d+\)?[).:-]\s+|[-*•]\s+)").expect("LIST_MARKER regex is valid");
    static ref LEADING_PUNCTUATION: Regex =
        Regex::new(r#"^[!@#$%^&*()_+\-=\[\]{};':"\\|,.<>/\s]+"#)
            .expect("LEADING_PUNCTUATION regex is valid");
    static ref WRAPPING_QUOTES: Regex =
        Regex::new(r#"^["“”']+(.+?)["“”']+$"#).expect("WRAPPING_QUOTES regex is valid");
}

/// Removes list numbering and bullets from the start of each line.
pub fn sanitize_question(text: &str) -> String {
    text.lines()
        .map(|line| LIST_MARKER.replace(line, ""))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Strips leading punctuation and wrapping quotes; keeps the input if nothing is left.
pub fn clean_response(text: &str) -> String {
    let content = text.trim();
    let stripped = LEADING_PUNCTUATION.replace(content, "");
    let unquoted = WRAPPING_QUOTES.replace(&stripped, "$1");
    let cleaned = unquoted.trim();
    if cleaned.is_empty() {
        text.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Sanitize then clean, the order replies are post-processed in.
pub fn tidy_reply(raw: &str) -> String {
    clean_response(&sanitize_question(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_numbering_and_bullets() {
        assert_eq!(
            sanitize_question("1. What outcomes matter?"),
            "What outcomes matter?"
        );
        assert_eq!(sanitize_question("(2) How do you measure it?"), "How do you measure it?");
        assert_eq!(sanitize_question("3: Next"), "Next");
        assert_eq!(sanitize_question("4- Next"), "Next");
        assert_eq!(
            sanitize_question("Noted.\n- How do routines help?\n• And rewards?"),
            "Noted.\nHow do routines help?\nAnd rewards?"
        );
    }

    #[test]
    fn test_sanitize_leaves_inline_numbers() {
        assert_eq!(
            sanitize_question("Children aged 5-7 need shorter tasks"),
            "Children aged 5-7 need shorter tasks"
        );
    }

    #[test]
    fn test_clean_strips_leading_punctuation() {
        assert_eq!(clean_response("...Understood. Next question?"), "Understood. Next question?");
        assert_eq!(clean_response(": Noted."), "Noted.");
    }

    #[test]
    fn test_clean_unwraps_quotes() {
        assert_eq!(
            clean_response("“How should Jamie sound to children?”"),
            "How should Jamie sound to children?"
        );
        assert_eq!(clean_response("“Noted.”"), "Noted.");
    }

    #[test]
    fn test_clean_falls_back_when_everything_is_stripped() {
        assert_eq!(clean_response("..."), "...");
    }

    #[test]
    fn test_tidy_reply_combines_both() {
        assert_eq!(tidy_reply("1. “What do you recommend?”"), "What do you recommend?");
    }
}
