use serde::Serialize;

use crate::llm_client::prompts::CHILD_NAME;

/// What an opening message is asking for, before the scripted questions begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Greeting,
    Smalltalk,
    WhoAreYou,
    WhoIsCompanion,
    WhoIsChild,
    AboutInterview,
    None,
}

const GREETINGS: &[&str] = &["hello", "hi", "hey"];
const SMALLTALK: &[&str] = &["how are you", "how r u", "how are u", "how's it going"];
const WHO_ARE_YOU: &[&str] = &["who are you", "who r u", "what are you"];
const ABOUT_INTERVIEW: &[&str] = &[
    "what is this about",
    "what is this interview about",
    "what is this interview",
    "what's this about",
    "why am i here",
    "what will you ask",
    "purpose of this interview",
    "what is this for",
];
const AFFIRMATIVES: &[&str] = &[
    "yes",
    "yeah",
    "yep",
    "sure",
    "ok",
    "okay",
    "ready",
    "let's start",
    "lets start",
    "begin",
    "start",
    "go ahead",
    "yup",
];

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// True when `phrase` occurs in `text` bounded by non-word characters on both sides.
pub fn contains_phrase(text: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    text.match_indices(phrase).any(|(start, matched)| {
        let end = start + matched.len();
        let before_ok = text[..start].chars().next_back().map_or(true, |c| !is_word_char(c));
        let after_ok = text[end..].chars().next().map_or(true, |c| !is_word_char(c));
        before_ok && after_ok
    })
}

fn any_phrase(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| contains_phrase(text, p))
}

/// Classifies a message; categories are checked in priority order.
pub fn classify_message(message: &str, companion: &str) -> MessageKind {
    let m = message.trim().to_lowercase();
    if m.is_empty() {
        return MessageKind::None;
    }

    let companion = companion.trim().to_lowercase();
    let child = CHILD_NAME.to_lowercase();
    let who_is_companion = [format!("who is {companion}"), format!("what is {companion}")];
    let who_is_child = [format!("who is {child}"), format!("what is {child}")];

    if any_phrase(&m, GREETINGS) {
        MessageKind::Greeting
    } else if any_phrase(&m, SMALLTALK) {
        MessageKind::Smalltalk
    } else if any_phrase(&m, WHO_ARE_YOU) {
        MessageKind::WhoAreYou
    } else if !companion.is_empty() && who_is_companion.iter().any(|p| contains_phrase(&m, p)) {
        MessageKind::WhoIsCompanion
    } else if who_is_child.iter().any(|p| contains_phrase(&m, p)) {
        MessageKind::WhoIsChild
    } else if any_phrase(&m, ABOUT_INTERVIEW) {
        MessageKind::AboutInterview
    } else {
        MessageKind::None
    }
}

pub fn is_affirmative(message: &str) -> bool {
    let m = message.trim().to_lowercase();
    any_phrase(&m, AFFIRMATIVES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_requires_whole_word() {
        assert_eq!(classify_message("Hi there", "Jamie"), MessageKind::Greeting);
        assert_eq!(classify_message("  HEY!", "Jamie"), MessageKind::Greeting);
        assert_eq!(classify_message("this is fine", "Jamie"), MessageKind::None);
        assert_eq!(classify_message("whichever works", "Jamie"), MessageKind::None);
    }

    #[test]
    fn test_priority_order() {
        // Greeting wins over who-are-you when both appear.
        assert_eq!(classify_message("hello, who are you?", "Jamie"), MessageKind::Greeting);
        assert_eq!(classify_message("How's it going?", "Jamie"), MessageKind::Smalltalk);
        assert_eq!(classify_message("what are you exactly", "Jamie"), MessageKind::WhoAreYou);
    }

    #[test]
    fn test_companion_and_child_questions() {
        assert_eq!(classify_message("Who is Jamie?", "Jamie"), MessageKind::WhoIsCompanion);
        assert_eq!(classify_message("what is jamie", "Jamie"), MessageKind::WhoIsCompanion);
        assert_eq!(classify_message("who is timmy", "Jamie"), MessageKind::WhoIsChild);
        // Companion name is templated, not hard-coded.
        assert_eq!(classify_message("who is Jamie", "Mr French"), MessageKind::None);
        assert_eq!(
            classify_message("who is mr french", "Mr French"),
            MessageKind::WhoIsCompanion
        );
    }

    #[test]
    fn test_about_interview() {
        assert_eq!(
            classify_message("Why am I here?", "Jamie"),
            MessageKind::AboutInterview
        );
        assert_eq!(
            classify_message("what's this about", "Jamie"),
            MessageKind::AboutInterview
        );
    }

    #[test]
    fn test_empty_is_none() {
        assert_eq!(classify_message("   ", "Jamie"), MessageKind::None);
    }

    #[test]
    fn test_affirmative() {
        assert!(is_affirmative("Yes please"));
        assert!(is_affirmative("ok"));
        assert!(is_affirmative("Let's start!"));
        assert!(is_affirmative("go ahead"));
        assert!(!is_affirmative("no thanks"));
        assert!(!is_affirmative("yesterday was busy"));
        assert!(!is_affirmative("restart later"));
    }
}
