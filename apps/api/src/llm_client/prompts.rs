// Shared prompt constants and prompt-building utilities.
// Each service that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// Placeholder replaced with the companion's display name.
pub const COMPANION_PLACEHOLDER: &str = "{companion}";

/// Placeholder replaced with the child persona's name.
pub const CHILD_PLACEHOLDER: &str = "{child}";

/// The child persona every companion supports.
pub const CHILD_NAME: &str = "Timmy";

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are an expert at extracting structured behavioral rules \
    from conversational data. You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON array. \
    Do NOT include explanations or apologies.";

/// Instruction that keeps extraction grounded in what the expert actually said.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Only extract guidance the expert explicitly stated in the conversation \
    or that appears in the provided documents. Do NOT generate rules from your own knowledge. \
    If neither source contains actionable behavioral advice, return an empty JSON array [].";

/// Fills `{companion}` and `{child}` placeholders in a prompt template.
pub fn render(template: &str, companion: &str) -> String {
    fill_slots(
        template,
        &[(COMPANION_PLACEHOLDER, companion), (CHILD_PLACEHOLDER, CHILD_NAME)],
    )
}

/// Replaces placeholders in a single left-to-right pass. Inserted values are
/// never scanned again, so text that happens to contain a placeholder stays as written.
pub fn fill_slots(template: &str, slots: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    loop {
        let next = slots
            .iter()
            .filter(|(placeholder, _)| !placeholder.is_empty())
            .filter_map(|(placeholder, value)| {
                rest.find(placeholder).map(|at| (at, *placeholder, *value))
            })
            .min_by_key(|(at, _, _)| *at);
        match next {
            Some((at, placeholder, value)) => {
                out.push_str(&rest[..at]);
                out.push_str(value);
                rest = &rest[at + placeholder.len()..];
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_fills_both_placeholders() {
        let out = render("{companion} reminds {child}; {companion} praises effort.", "Jamie");
        assert_eq!(out, "Jamie reminds Timmy; Jamie praises effort.");
    }

    #[test]
    fn test_fill_slots_does_not_rescan_inserted_text() {
        let out = fill_slots("A={a} B={b}", &[("{a}", "literal {b}"), ("{b}", "two")]);
        assert_eq!(out, "A=literal {b} B=two");
    }

    #[test]
    fn test_render_leaves_plain_text_alone() {
        assert_eq!(render("No placeholders here.", "Jamie"), "No placeholders here.");
    }
}
