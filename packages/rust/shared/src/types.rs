//! Core domain types for the two-phase paper pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Which pipeline phase(s) a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Search, chunk, and index papers.
    Ingestion,
    /// Retrieve context and synthesize an answer.
    Query,
    /// Ingestion followed by query.
    Both,
}

impl Phase {
    /// Whether this selection includes the ingestion phase.
    pub fn includes_ingestion(self) -> bool {
        matches!(self, Self::Ingestion | Self::Both)
    }

    /// Whether this selection includes the query phase.
    pub fn includes_query(self) -> bool {
        matches!(self, Self::Query | Self::Both)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ingestion => "ingestion",
            Self::Query => "query",
            Self::Both => "both",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ingestion" => Ok(Self::Ingestion),
            "query" => Ok(Self::Query),
            "both" => Ok(Self::Both),
            other => Err(format!(
                "unknown phase '{other}': expected ingestion, query, or both"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// ToolServer
// ---------------------------------------------------------------------------

/// Launch descriptor for one external tool subprocess.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServer {
    /// Unique registry key.
    pub name: String,
    /// Executable to launch.
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables set on the subprocess, on top of the inherited
    /// environment.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Paper
// ---------------------------------------------------------------------------

/// A paper descriptor as returned by the literature-search collaborator.
///
/// Every field is tolerant of absence; a paper without an id is rejected
/// later, when it is processed, so one malformed entry cannot fail the
/// whole search payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    /// Collaborator-assigned identifier.
    #[serde(default, alias = "entry_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Paper title.
    #[serde(default = "unknown_title")]
    pub title: String,

    /// Author names.
    #[serde(default)]
    pub authors: Vec<String>,

    /// Where the paper came from.
    #[serde(default, alias = "url", skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

fn unknown_title() -> String {
    "Unknown".into()
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// Provenance metadata attached to every chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMeta {
    /// Source paper identifier.
    pub paper_id: String,
    /// Source paper title.
    pub title: String,
    /// Source paper authors.
    pub authors: Vec<String>,
    /// Zero-based position of this chunk within its paper.
    pub chunk_index: usize,
}

/// One overlapping segment of a paper's extracted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Segment text.
    pub text: String,
    /// Provenance metadata.
    pub metadata: ChunkMeta,
}

// ---------------------------------------------------------------------------
// ContextMatch
// ---------------------------------------------------------------------------

/// Metadata carried on a retrieval hit. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchMeta {
    /// Source paper title.
    #[serde(default = "unknown_title")]
    pub title: String,
    /// Zero-based position of the chunk within its paper.
    #[serde(default)]
    pub chunk_index: usize,
}

/// A retrieval hit from the vector store. All fields are optional because
/// stores differ in what they return per match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextMatch {
    /// Chunk text, when the store includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Chunk provenance metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MatchMeta>,

    /// Similarity score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl ContextMatch {
    /// Title of the source paper, when metadata carried one.
    pub fn title(&self) -> &str {
        self.metadata
            .as_ref()
            .map(|m| m.title.as_str())
            .unwrap_or("Unknown")
    }

    /// Chunk index within the source paper.
    pub fn chunk_index(&self) -> usize {
        self.metadata.as_ref().map(|m| m.chunk_index).unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Interaction
// ---------------------------------------------------------------------------

/// A source citation attached to an interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Source paper title.
    pub title: String,
    /// Chunk index within the source paper.
    pub chunk_index: usize,
}

/// One query/answer interaction, logged to the workspace store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    /// The user's question.
    pub query: String,
    /// The synthesized answer.
    pub answer: String,
    /// Up to the top three retrieval sources.
    pub sources: Vec<SourceRef>,
    /// When the interaction happened.
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let s = id.to_string();
        let parsed: RunId = s.parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn phase_parsing() {
        assert_eq!("ingestion".parse::<Phase>().unwrap(), Phase::Ingestion);
        assert_eq!("Query".parse::<Phase>().unwrap(), Phase::Query);
        assert_eq!("both".parse::<Phase>().unwrap(), Phase::Both);
        assert!("neither".parse::<Phase>().is_err());

        assert_eq!(Phase::Both.to_string(), "both");
        assert!(Phase::Both.includes_ingestion());
        assert!(Phase::Both.includes_query());
        assert!(!Phase::Query.includes_ingestion());
        assert!(!Phase::Ingestion.includes_query());
    }

    #[test]
    fn paper_accepts_field_aliases() {
        let json = r#"{
            "entry_id": "2401.01234v1",
            "title": "An Example Paper",
            "authors": ["A. Author", "B. Author"],
            "url": "https://arxiv.org/abs/2401.01234"
        }"#;
        let paper: Paper = serde_json::from_str(json).expect("deserialize");
        assert_eq!(paper.id.as_deref(), Some("2401.01234v1"));
        assert_eq!(paper.title, "An Example Paper");
        assert_eq!(paper.authors.len(), 2);
        assert_eq!(
            paper.source_url.as_deref(),
            Some("https://arxiv.org/abs/2401.01234")
        );
    }

    #[test]
    fn paper_defaults_missing_fields() {
        let paper: Paper = serde_json::from_str("{}").expect("deserialize");
        assert!(paper.id.is_none());
        assert_eq!(paper.title, "Unknown");
        assert!(paper.authors.is_empty());
        assert!(paper.source_url.is_none());
    }

    #[test]
    fn context_match_tolerates_missing_fields() {
        let hit: ContextMatch = serde_json::from_str("{}").expect("deserialize");
        assert!(hit.text.is_none());
        assert_eq!(hit.title(), "Unknown");
        assert_eq!(hit.chunk_index(), 0);

        let json = r#"{
            "text": "chunk body",
            "metadata": {"title": "Some Paper", "chunk_index": 3, "paper_id": "xyz"},
            "score": 0.87
        }"#;
        let hit: ContextMatch = serde_json::from_str(json).expect("deserialize");
        assert_eq!(hit.text.as_deref(), Some("chunk body"));
        assert_eq!(hit.title(), "Some Paper");
        assert_eq!(hit.chunk_index(), 3);
    }

    #[test]
    fn chunk_metadata_serializes_flat() {
        let chunk = Chunk {
            text: "segment".into(),
            metadata: ChunkMeta {
                paper_id: "2401.01234v1".into(),
                title: "An Example Paper".into(),
                authors: vec!["A. Author".into()],
                chunk_index: 0,
            },
        };
        let value = serde_json::to_value(&chunk).expect("serialize");
        assert_eq!(value["text"], "segment");
        assert_eq!(value["metadata"]["paper_id"], "2401.01234v1");
        assert_eq!(value["metadata"]["chunk_index"], 0);
    }
}
