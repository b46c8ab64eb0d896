use super::Section;

/// Token budget per chunk sent to the embedding model.
pub const DEFAULT_MAX_TOKENS: usize = 500;

/// A chunk ready for embedding, keeping the location of the section it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub index: i32,
    pub content: String,
    pub page_number: Option<i32>,
    pub slide_number: Option<i32>,
}

/// Rough token count: one token per four characters.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Sentence-packs `text` into chunks of at most `max_tokens` estimated tokens.
///
/// Sentences are split on `". "`. A chunk closes when the next sentence would
/// push it over budget; a single oversized sentence still becomes its own chunk.
pub fn chunk_text(text: &str, max_tokens: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in text.split(". ") {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }
        let piece = if sentence.ends_with(['.', '!', '?']) {
            sentence.to_string()
        } else {
            format!("{sentence}.")
        };

        let candidate_tokens = estimate_tokens(&current) + estimate_tokens(&piece);
        if candidate_tokens > max_tokens && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&piece);
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Chunks every section in order, numbering chunks across the whole document.
pub fn chunk_sections(sections: &[Section], max_tokens: usize) -> Vec<TextChunk> {
    sections
        .iter()
        .flat_map(|section| {
            chunk_text(&section.text, max_tokens)
                .into_iter()
                .map(move |content| (section, content))
        })
        .enumerate()
        .map(|(i, (section, content))| TextChunk {
            index: i as i32,
            content,
            page_number: section.page_number,
            slide_number: section.slide_number,
        })
        .collect()
}
