// Rule extraction prompt templates.
// Every placeholder is filled in one pass by `llm_client::prompts::fill_slots`.

use crate::llm_client::prompts::{
    fill_slots, CHILD_NAME, CHILD_PLACEHOLDER, COMPANION_PLACEHOLDER, GROUNDING_INSTRUCTION,
    JSON_ONLY_SYSTEM,
};

pub const EXTRACTION_SYSTEM: &str = JSON_ONLY_SYSTEM;

pub const EXTRACTION_PROMPT: &str = r#"You are analyzing an interview with a behavioral expert to extract rules for {companion}.

ABOUT {companion}:
{companion} is a conversational AI family assistant that helps manage children's routines, tasks, and behavior. It has three chat modes:
1. Parent <-> {companion} (task management, progress reports)
2. Child <-> {companion} (reminders, encouragement, task completion)
3. Parent <-> Child (capturing family instructions)
{companion} uses a zone system: Red (frustrated/stressed), Green (normal), Blue (tired/low energy).

EXTRACTION RULES:
- Extract rules from BOTH the conversation AND any provided document content.
- If the conversation is short but documents contain rich content, extract rules primarily from the documents.
- Only extract rules {companion} can APPLY to children's behavior, routines, motivation, de-escalation, rewards/consequences, communication, or parent guidance.
- STRICTLY EXCLUDE interview logistics, facilitator phrases, character definitions (who is {companion}, who is {child}) and small talk.
- {grounding}

Each rule must follow this EXACT format:
{
  "if": {
    "event": "specific trigger or situation",
    "context": "additional context (only if needed)",
    "user_type": "target audience (child, parent, general)"
  },
  "then": {
    "action": "specific action {companion} should take",
    "response": "exact words or approach {companion} should use",
    "duration": "time duration if applicable (e.g. 5_minutes, until_calm)",
    "tone": "calm | encouraging | firm | supportive"
  },
  "priority": "high | medium | low",
  "category": "rule category (e.g. crisis_management, motivation, discipline, communication)",
  "source": "conversation | document"
}

CONVERSATION:
{transcript}
{documents}
Return a JSON array of rules. If no applicable behavior rules exist, return []."#;

/// Full user prompt for one extraction run.
pub fn build_extraction_prompt(
    companion: &str,
    transcript: &str,
    document_context: Option<&str>,
) -> String {
    let documents = match document_context {
        Some(ctx) if !ctx.trim().is_empty() => format!("\n{ctx}\n"),
        _ => String::new(),
    };
    fill_slots(
        EXTRACTION_PROMPT,
        &[
            (COMPANION_PLACEHOLDER, companion),
            (CHILD_PLACEHOLDER, CHILD_NAME),
            ("{grounding}", GROUNDING_INSTRUCTION),
            ("{transcript}", transcript),
            ("{documents}", &documents),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_names_companion_and_child() {
        let prompt = build_extraction_prompt("Jamie", "USER: hi", None);
        assert!(prompt.contains("rules for Jamie."));
        assert!(prompt.contains("who is Timmy"));
        assert!(!prompt.contains("{companion}"));
        assert!(!prompt.contains("{grounding}"));
        assert!(prompt.contains("USER: hi"));
    }

    #[test]
    fn test_prompt_includes_document_context() {
        let prompt = build_extraction_prompt(
            "Jamie",
            "USER: hi",
            Some("RELEVANT DOCUMENT CONTEXT:\n[Source: guide.pdf, page 2]\nUse timers."),
        );
        assert!(prompt.contains("[Source: guide.pdf, page 2]"));
        assert!(!prompt.contains("{documents}"));
    }

    #[test]
    fn test_transcript_placeholders_survive_verbatim() {
        let transcript = "USER: my template literally says {documents} and {companion}";
        let prompt = build_extraction_prompt(
            "Jamie",
            transcript,
            Some("RELEVANT DOCUMENT CONTEXT:\nUse timers."),
        );
        assert!(prompt.contains(transcript));
        assert_eq!(prompt.matches("Use timers.").count(), 1);
    }
}
