pub mod chroma;
pub mod chunker;
pub mod handlers;
pub mod ingest;
pub mod parser;
pub mod vector_store;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("No text content could be extracted from {0}")]
    NoText(String),

    #[error("Failed to parse {file}: {reason}")]
    Parse { file: String, reason: String },
}

impl DocumentError {
    pub fn parse(file: &str, reason: impl ToString) -> Self {
        DocumentError::Parse {
            file: file.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Upload formats the parser understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Pdf,
    Docx,
    Pptx,
    Txt,
}

impl DocType {
    /// Decides the parser from the file extension (case-insensitive).
    pub fn from_filename(filename: &str) -> Result<Self, DocumentError> {
        let ext = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Ok(DocType::Pdf),
            "docx" => Ok(DocType::Docx),
            "pptx" => Ok(DocType::Pptx),
            "txt" => Ok(DocType::Txt),
            "" => Err(DocumentError::UnsupportedType(filename.to_string())),
            other => Err(DocumentError::UnsupportedType(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Pdf => "pdf",
            DocType::Docx => "docx",
            DocType::Pptx => "pptx",
            DocType::Txt => "txt",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            DocType::Pdf => "application/pdf",
            DocType::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            DocType::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            DocType::Txt => "text/plain; charset=utf-8",
        }
    }
}

/// A contiguous span of extracted text with its location in the source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub text: String,
    pub page_number: Option<i32>,
    pub slide_number: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub doc_type: DocType,
    pub sections: Vec<Section>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_type_from_extension() {
        assert_eq!(DocType::from_filename("Notes.PDF").unwrap(), DocType::Pdf);
        assert_eq!(DocType::from_filename("plan.v2.docx").unwrap(), DocType::Docx);
        assert_eq!(DocType::from_filename("deck.pptx").unwrap(), DocType::Pptx);
        assert_eq!(DocType::from_filename("readme.txt").unwrap(), DocType::Txt);
    }

    #[test]
    fn test_doc_type_rejects_unknown_and_missing_extension() {
        match DocType::from_filename("malware.exe") {
            Err(DocumentError::UnsupportedType(ext)) => assert_eq!(ext, "exe"),
            other => panic!("expected UnsupportedType, got {other:?}"),
        }
        assert!(DocType::from_filename("no_extension").is_err());
    }
}
