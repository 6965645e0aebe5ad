//! Core data models used throughout chartsift.
//!
//! These types represent the notes, chunks, and retrieval results that flow
//! through the extraction and retrieval pipeline.

/// Raw note candidate produced by the extractor before cleaning.
///
/// Created transiently per bundle scan and consumed immediately by the
/// sanitizer; never persisted in raw form.
#[derive(Debug, Clone)]
pub struct CandidateNote {
    pub note_id: String,
    pub subject_id: String,
    pub source_bundle_id: String,
    pub raw_text: String,
    pub note_type: String,
    pub authoring_party: String,
    pub timestamp: Option<String>,
    pub organization: Option<String>,
}

/// Provenance carried alongside every chunk of a note.
#[derive(Debug, Clone)]
pub struct ChunkMetadata {
    pub note_type: String,
    pub timestamp: Option<String>,
    pub authoring_party: String,
    pub organization: Option<String>,
    pub source_bundle_id: String,
    /// Total number of chunks the parent note was split into.
    pub chunk_total: i64,
}

/// A chunk of a cleaned note, the unit of embedding and retrieval.
///
/// Identity key is (`subject_id`, `note_id`, `chunk_index`); re-ingestion
/// of the same key overwrites rather than duplicates.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub subject_id: String,
    pub note_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A ranked chunk returned from similarity search.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    /// Cosine-derived similarity in [0, 1]; higher is more similar.
    pub similarity: f32,
}

/// The assembled text block handed to the prompt consumer.
#[derive(Debug, Clone)]
pub struct ContextBlock {
    pub text: String,
    /// Number of chunk records that contributed to the block.
    pub count: usize,
}

impl ContextBlock {
    pub fn empty(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            count: 0,
        }
    }
}
