use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::prompts::{build_extraction_prompt, EXTRACTION_SYSTEM};
use super::{ExtractedRule, Priority, RuleAction, RuleSource, RuleTrigger};
use crate::documents::ingest::document_context_for;
use crate::errors::AppError;
use crate::interview::sanitize::sanitize_question;
use crate::llm_client::prompts::CHILD_NAME;
use crate::llm_client::{strip_json_fences, ChatOptions};
use crate::models::interview::{ChatTurn, InterviewSessionRow, Role};
use crate::state::AppState;

const EXTRACTION_CONTEXT_CHUNKS: usize = 20;
const EXTRACTION_CONTEXT_CHARS: usize = 12_000;
const MIN_STATEMENT_CHARS: usize = 20;
const QUERY_ANSWER_COUNT: usize = 5;

const EMPTY_ANSWERS: &[&str] = &["NONE", "NO RULES", "NO BEHAVIORAL RULES", "N/A"];

const STATEMENT_TERMS: &[&str] = &["child", "parent", "family", "behavior", "task", "routine"];

const META_TERMS: &[&str] = &[
    "interview",
    "question",
    "script",
    "facilitate",
    "introduce yourself",
    "project context",
    "characters",
    "definition",
    "i'm here to help",
    "let's dive right in",
    "area of expertise",
    "describe your expertise",
];

const BEHAVIOR_TERMS: &[&str] = &[
    "child", "kid", "parent", "family", "behavior", "behaviour", "routine", "task", "reward",
    "consequence", "reinforcement", "positive", "timeout", "break", "homework", "bedtime",
    "screen", "calm", "de-escalation", "encourage", "motivate", "red zone", "green zone",
    "blue zone", "emotion", "frustrated", "angry", "upset", "praise", "token", "sticker", "chore",
    "schedule", "reminder",
];

/// One item recovered from a model reply.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRule {
    /// A JSON object that still needs validating.
    Structured(Value),
    /// A plain-text guidance line from a non-JSON reply.
    Statement(String),
}

/// Transcript as `ROLE: content` lines.
pub fn render_transcript(turns: &[ChatTurn]) -> String {
    turns
        .iter()
        .filter(|t| t.role != Role::System)
        .map(|t| format!("{}: {}", t.role.as_str().to_uppercase(), t.content.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// First complete JSON value starting at `text`, ignoring whatever follows it.
fn leading_value(text: &str) -> Option<Value> {
    serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .next()
        .and_then(Result::ok)
}

/// First `[` that opens a complete JSON array.
fn complete_array(text: &str) -> Option<Vec<Value>> {
    text.match_indices('[')
        .find_map(|(start, _)| match leading_value(&text[start..]) {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        })
}

/// Objects that parsed in full before an array was cut off.
fn salvage_objects(text: &str) -> Vec<Value> {
    for (start, _) in text.match_indices('[') {
        let mut rest = &text[start + 1..];
        let mut items = Vec::new();
        loop {
            rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
            if !rest.starts_with('{') {
                break;
            }
            let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
            match stream.next() {
                Some(Ok(value)) => {
                    let consumed = stream.byte_offset();
                    items.push(value);
                    rest = &rest[consumed..];
                }
                _ => break,
            }
        }
        if !items.is_empty() {
            return items;
        }
    }
    Vec::new()
}

/// First complete object that looks like a rule.
fn single_rule_object(text: &str) -> Option<Value> {
    text.match_indices('{')
        .find_map(|(start, _)| match leading_value(&text[start..]) {
            Some(value @ Value::Object(_)) if value.get("if").is_some() => Some(value),
            _ => None,
        })
}

/// Pulls rules out of a model reply: a JSON array, the complete objects of a
/// truncated array, a single JSON object, or guidance lines when the reply
/// carries no JSON at all.
pub fn parse_extraction_response(text: &str, companion: &str) -> Vec<RawRule> {
    let text = strip_json_fences(text);
    if text.len() < 10 || EMPTY_ANSWERS.contains(&text.to_uppercase().as_str()) {
        return Vec::new();
    }

    if let Some(items) = complete_array(text) {
        return items.into_iter().map(RawRule::Structured).collect();
    }
    let salvaged = salvage_objects(text);
    if !salvaged.is_empty() {
        warn!("Extraction reply was truncated; kept {} complete rules", salvaged.len());
        return salvaged.into_iter().map(RawRule::Structured).collect();
    }
    if let Some(object) = single_rule_object(text) {
        return vec![RawRule::Structured(object)];
    }
    if text.contains('{') {
        warn!("Extraction reply contained unparseable JSON; no rules recovered");
        return Vec::new();
    }

    debug!("Extraction reply was not JSON; falling back to statements");
    parse_statements(text, companion)
        .into_iter()
        .map(RawRule::Statement)
        .collect()
}

fn parse_statements(text: &str, companion: &str) -> Vec<String> {
    let companion = companion.to_lowercase();
    sanitize_question(text)
        .lines()
        .map(str::trim)
        .filter(|line| !EMPTY_ANSWERS.contains(&line.to_uppercase().as_str()))
        .filter(|line| line.chars().count() >= MIN_STATEMENT_CHARS)
        .filter(|line| {
            let lowered = line.to_lowercase();
            STATEMENT_TERMS.iter().any(|t| lowered.contains(t))
                || (!companion.is_empty() && lowered.contains(&companion))
        })
        .map(str::to_string)
        .collect()
}

fn field(map: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    let value = match map.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Null => return None,
        other => other.to_string(),
    };
    (!value.is_empty()).then_some(value)
}

fn section_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => return None,
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

/// Validates a model-produced rule. `None` when it lacks a trigger or an action.
pub fn normalize_rule(value: &Value) -> Option<ExtractedRule> {
    let rule = value.as_object()?;
    let if_part = rule.get("if")?;
    let then_part = rule.get("then")?;

    let trigger = match if_part {
        Value::Object(map) => RuleTrigger {
            event: field(map, "event"),
            context: field(map, "context"),
            user_type: field(map, "user_type"),
        },
        other => RuleTrigger {
            event: section_text(other),
            ..Default::default()
        },
    };
    let action = match then_part {
        Value::Object(map) => RuleAction {
            action: field(map, "action"),
            response: field(map, "response"),
            duration: field(map, "duration"),
            tone: field(map, "tone"),
        },
        other => RuleAction {
            action: section_text(other),
            ..Default::default()
        },
    };

    let has_trigger = trigger.event.is_some() || trigger.context.is_some();
    let has_action = action.action.is_some() || action.response.is_some();
    if !has_trigger || !has_action {
        return None;
    }

    let priority = rule
        .get("priority")
        .and_then(Value::as_str)
        .map(Priority::parse_lenient)
        .unwrap_or_default();
    let category = rule
        .get("category")
        .and_then(Value::as_str)
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "general".to_string());
    let source = rule
        .get("source")
        .and_then(Value::as_str)
        .map(RuleSource::parse_lenient)
        .unwrap_or_default();

    Some(ExtractedRule {
        trigger,
        action,
        priority,
        category,
        source,
    })
}

/// Action-only rule for a plain guidance line.
pub fn statement_rule(statement: &str) -> ExtractedRule {
    ExtractedRule {
        trigger: RuleTrigger::default(),
        action: RuleAction {
            action: Some(statement.trim().to_string()),
            ..Default::default()
        },
        priority: Priority::Medium,
        category: "general".to_string(),
        source: RuleSource::Conversation,
    }
}

fn searchable_text(rule: &ExtractedRule) -> String {
    let t = &rule.trigger;
    let a = &rule.action;
    [
        &t.event,
        &t.context,
        &t.user_type,
        &a.action,
        &a.response,
        &a.duration,
        &a.tone,
    ]
    .into_iter()
    .flatten()
    .chain(std::iter::once(&rule.category))
    .map(|s| s.to_lowercase())
    .collect::<Vec<_>>()
    .join("\n")
}

/// Rejects interview chatter; keeps rules that talk about children, families or routines.
pub fn is_behavior_rule(rule: &ExtractedRule, companion: &str) -> bool {
    let text = searchable_text(rule);
    let companion = companion.to_lowercase();
    let persona_questions = [
        format!("who is {companion}"),
        format!("what is {companion}"),
        format!("who is {}", CHILD_NAME.to_lowercase()),
    ];

    if META_TERMS.iter().any(|t| text.contains(t))
        || persona_questions.iter().any(|q| text.contains(q.as_str()))
    {
        return false;
    }
    BEHAVIOR_TERMS.iter().any(|t| text.contains(t))
}

/// Lowercased `event|action` pair; `None` when the rule has neither.
pub fn rule_key(event: Option<&str>, action: Option<&str>) -> Option<String> {
    let key = format!(
        "{}|{}",
        event.unwrap_or_default().trim().to_lowercase(),
        action.unwrap_or_default().trim().to_lowercase()
    );
    (key != "|").then_some(key)
}

fn extracted_key(rule: &ExtractedRule) -> Option<String> {
    rule_key(rule.trigger.event.as_deref(), rule.action.action.as_deref())
}

/// Keeps the first rule of each `event|action` pair.
pub fn dedup_rules(rules: Vec<ExtractedRule>) -> Vec<ExtractedRule> {
    let mut seen = HashSet::new();
    rules
        .into_iter()
        .filter(|rule| {
            let Some(key) = extracted_key(rule) else {
                return true;
            };
            let fresh = seen.insert(key);
            if !fresh {
                debug!("Dropping duplicate rule: {}", rule_text(rule));
            }
            fresh
        })
        .collect()
}

/// Drops rules whose `event|action` pair is already covered by a reviewed rule.
pub fn without_known(rules: Vec<ExtractedRule>, known: &HashSet<String>) -> Vec<ExtractedRule> {
    rules
        .into_iter()
        .filter(|rule| match extracted_key(rule) {
            Some(key) if known.contains(&key) => {
                debug!("Skipping rule already reviewed: {}", rule_text(rule));
                false
            }
            _ => true,
        })
        .collect()
}

fn sentence(text: &str) -> String {
    let text = text.trim().trim_end_matches('.');
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Human-readable form stored alongside the structured rule.
pub fn rule_text(rule: &ExtractedRule) -> String {
    let t = &rule.trigger;
    let a = &rule.action;
    let then = a
        .action
        .as_deref()
        .or(a.response.as_deref())
        .unwrap_or_default();

    let mut out = match (t.event.as_deref(), t.context.as_deref()) {
        (Some(event), Some(context)) => format!(
            "If {} ({}), then {}.",
            event.trim_end_matches('.'),
            context.trim_end_matches('.'),
            then.trim_end_matches('.')
        ),
        (Some(condition), None) | (None, Some(condition)) => format!(
            "If {}, then {}.",
            condition.trim_end_matches('.'),
            then.trim_end_matches('.')
        ),
        (None, None) => format!("{}.", sentence(then)),
    };

    if let (Some(response), Some(_)) = (a.response.as_deref(), a.action.as_deref()) {
        out.push_str(&format!(" Say: \"{}\".", response.trim().trim_matches('"')));
    }
    if let Some(tone) = a.tone.as_deref() {
        out.push_str(&format!(" Tone: {tone}."));
    }
    out
}

/// Validates, filters and dedups everything recovered from one reply.
pub fn finalize_rules(raw: Vec<RawRule>, companion: &str) -> Vec<ExtractedRule> {
    let total = raw.len();
    let rules: Vec<ExtractedRule> = raw
        .into_iter()
        .filter_map(|item| match item {
            RawRule::Structured(value) => {
                let rule = normalize_rule(&value);
                if rule.is_none() {
                    warn!("Skipping malformed rule: {}", value);
                }
                rule
            }
            RawRule::Statement(line) => Some(statement_rule(&line)),
        })
        .filter(|rule| is_behavior_rule(rule, companion))
        .collect();
    let unique = dedup_rules(rules);
    info!("Kept {} of {} extracted rules", unique.len(), total);
    unique
}

fn context_query(session: &InterviewSessionRow) -> String {
    let answers: Vec<&str> = session
        .conversation
        .0
        .iter()
        .rev()
        .filter(|t| t.role == Role::User)
        .take(QUERY_ANSWER_COUNT)
        .map(|t| t.content.as_str())
        .collect();
    format!(
        "{} child behavior strategies {}",
        session.expertise_area,
        answers.join(" ")
    )
}

/// Runs the model over the full transcript plus matching document chunks.
pub async fn extract_rules(
    state: &AppState,
    session: &InterviewSessionRow,
    companion: &str,
) -> Result<Vec<ExtractedRule>, AppError> {
    let document_context = document_context_for(
        state,
        session.id,
        &context_query(session),
        EXTRACTION_CONTEXT_CHUNKS,
        EXTRACTION_CONTEXT_CHARS,
    )
    .await?;

    let transcript = render_transcript(&session.conversation.0);
    if transcript.trim().is_empty() && document_context.is_none() {
        info!("Session {} has nothing to extract from", session.id);
        return Ok(Vec::new());
    }

    let prompt = build_extraction_prompt(companion, &transcript, document_context.as_deref());
    info!(
        "Extracting rules for session {} ({} messages, documents: {})",
        session.id,
        session.conversation.0.len(),
        document_context.is_some()
    );

    let reply = state
        .llm
        .complete(EXTRACTION_SYSTEM, &prompt, ChatOptions::EXTRACTION)
        .await?;
    Ok(finalize_rules(
        parse_extraction_response(&reply, companion),
        companion,
    ))
}
