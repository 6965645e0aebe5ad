//! FHIR bundle wire types.
//!
//! A bundle is a JSON document carrying a list of typed resource entries for
//! one patient. Only the resource kinds the extractor understands are modeled
//! with fields; everything else deserializes into [`Resource::Unrecognized`]
//! and is ignored downstream. Field shapes follow the FHIR R4 JSON layout as
//! emitted by synthetic-record generators: optionality is the rule, not the
//! exception.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Bundle {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    pub resource: Resource,
}

/// Closed sum over the resource kinds the extractor dispatches on.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "resourceType")]
pub enum Resource {
    Patient(PatientResource),
    DocumentReference(Box<DocumentReferenceResource>),
    DiagnosticReport(Box<DiagnosticReportResource>),
    Observation(Box<ObservationResource>),
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatientResource {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentReferenceResource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(rename = "type", default)]
    pub doc_type: Option<CodeableConcept>,
    #[serde(default)]
    pub author: Vec<Reference>,
    #[serde(default)]
    pub custodian: Option<Reference>,
    #[serde(default)]
    pub content: Vec<DocumentContent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentContent {
    #[serde(default)]
    pub attachment: Option<Attachment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    #[serde(rename = "contentType", default)]
    pub content_type: Option<String>,
    /// Base64-encoded payload.
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiagnosticReportResource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub code: Option<CodeableConcept>,
    #[serde(rename = "effectiveDateTime", default)]
    pub effective_date_time: Option<String>,
    #[serde(default)]
    pub issued: Option<String>,
    #[serde(default)]
    pub performer: Vec<Reference>,
    /// Narrative block; `div` holds HTML-ish markup.
    #[serde(default)]
    pub text: Option<Narrative>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Narrative {
    #[serde(default)]
    pub div: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservationResource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub code: Option<CodeableConcept>,
    #[serde(rename = "effectiveDateTime", default)]
    pub effective_date_time: Option<String>,
    #[serde(default)]
    pub issued: Option<String>,
    #[serde(default)]
    pub performer: Vec<Reference>,
    #[serde(default)]
    pub note: Vec<Annotation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Annotation {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodeableConcept {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub coding: Vec<Coding>,
}

impl CodeableConcept {
    /// Preferred human-readable label: `text`, else the first coding display.
    pub fn display(&self) -> Option<&str> {
        self.text
            .as_deref()
            .or_else(|| self.coding.iter().find_map(|c| c.display.as_deref()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Coding {
    #[serde(default)]
    pub display: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reference {
    #[serde(default)]
    pub display: Option<String>,
}
