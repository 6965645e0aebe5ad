//! Resource-to-note extraction.
//!
//! Walks a bundle's entries and pulls candidate raw text out of the resource
//! kinds that carry free-text clinical notes, together with provenance
//! metadata. Extraction is fail-soft end to end: a bundle without a Patient
//! resource yields nothing, a malformed resource is logged and skipped, and
//! a resource with no resolvable text is not emitted at all.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::bundle::{
    Bundle, DiagnosticReportResource, DocumentReferenceResource, ObservationResource, Resource,
};
use crate::models::CandidateNote;

const UNKNOWN: &str = "Unknown";

/// Extract every candidate note from a bundle, in entry order.
///
/// Bundles lacking a Patient resource cannot be attributed to a subject and
/// return an empty list; this is deliberate policy, not an error.
pub fn extract_notes(bundle: &Bundle) -> Vec<CandidateNote> {
    let Some(subject_id) = find_subject(bundle) else {
        tracing::warn!(
            bundle = bundle.id.as_deref().unwrap_or("(no id)"),
            "bundle has no Patient resource, skipping"
        );
        return Vec::new();
    };

    let bundle_id = bundle
        .id
        .clone()
        .unwrap_or_else(|| "unknown-bundle".to_string());

    let mut notes = Vec::new();

    for (idx, entry) in bundle.entry.iter().enumerate() {
        let extracted = match &entry.resource {
            Resource::DocumentReference(doc) => extract_document_reference(doc, idx),
            Resource::DiagnosticReport(report) => Ok(extract_diagnostic_report(report, idx)),
            Resource::Observation(obs) => Ok(extract_observation(obs, idx)),
            Resource::Patient(_) | Resource::Unrecognized => Ok(None),
        };

        match extracted {
            Ok(Some(partial)) => notes.push(partial.into_note(&subject_id, &bundle_id)),
            Ok(None) => {}
            Err(e) => {
                // One malformed resource must not lose the rest of the bundle.
                tracing::warn!(entry = idx, error = %e, "failed to extract resource, skipping");
            }
        }
    }

    notes
}

fn find_subject(bundle: &Bundle) -> Option<String> {
    bundle.entry.iter().find_map(|e| match &e.resource {
        Resource::Patient(p) => p.id.clone(),
        _ => None,
    })
}

/// Note fields gathered per resource before subject/bundle attribution.
struct PartialNote {
    note_id: String,
    raw_text: String,
    note_type: String,
    authoring_party: String,
    timestamp: Option<String>,
    organization: Option<String>,
}

impl PartialNote {
    fn into_note(self, subject_id: &str, bundle_id: &str) -> CandidateNote {
        CandidateNote {
            note_id: self.note_id,
            subject_id: subject_id.to_string(),
            source_bundle_id: bundle_id.to_string(),
            raw_text: self.raw_text,
            note_type: self.note_type,
            authoring_party: self.authoring_party,
            timestamp: self.timestamp,
            organization: self.organization,
        }
    }
}

fn fallback_note_id(id: &Option<String>, idx: usize) -> String {
    id.clone().unwrap_or_else(|| format!("note-{}", idx))
}

fn extract_document_reference(
    doc: &DocumentReferenceResource,
    idx: usize,
) -> anyhow::Result<Option<PartialNote>> {
    let Some(data) = doc
        .content
        .iter()
        .filter_map(|c| c.attachment.as_ref())
        .find_map(|a| a.data.as_deref())
    else {
        return Ok(None);
    };

    let bytes = BASE64.decode(data.trim())?;
    let raw_text = String::from_utf8(bytes)?;
    if raw_text.is_empty() {
        return Ok(None);
    }

    Ok(Some(PartialNote {
        note_id: fallback_note_id(&doc.id, idx),
        raw_text,
        note_type: doc
            .doc_type
            .as_ref()
            .and_then(|t| t.display())
            .unwrap_or("DocumentReference")
            .to_string(),
        authoring_party: doc
            .author
            .first()
            .and_then(|a| a.display.clone())
            .unwrap_or_else(|| UNKNOWN.to_string()),
        timestamp: doc.date.clone(),
        organization: doc.custodian.as_ref().and_then(|c| c.display.clone()),
    }))
}

fn extract_diagnostic_report(report: &DiagnosticReportResource, idx: usize) -> Option<PartialNote> {
    // Narrative div is HTML-ish markup; the sanitizer strips it later.
    let raw_text = report.text.as_ref().and_then(|t| t.div.clone())?;
    if raw_text.is_empty() {
        return None;
    }

    Some(PartialNote {
        note_id: fallback_note_id(&report.id, idx),
        raw_text,
        note_type: report
            .code
            .as_ref()
            .and_then(|c| c.display())
            .unwrap_or("DiagnosticReport")
            .to_string(),
        authoring_party: report
            .performer
            .first()
            .and_then(|p| p.display.clone())
            .unwrap_or_else(|| UNKNOWN.to_string()),
        timestamp: report
            .effective_date_time
            .clone()
            .or_else(|| report.issued.clone()),
        organization: None,
    })
}

fn extract_observation(obs: &ObservationResource, idx: usize) -> Option<PartialNote> {
    let annotations: Vec<&str> = obs
        .note
        .iter()
        .filter_map(|n| n.text.as_deref())
        .filter(|t| !t.is_empty())
        .collect();
    if annotations.is_empty() {
        return None;
    }

    Some(PartialNote {
        note_id: fallback_note_id(&obs.id, idx),
        raw_text: annotations.join("\n"),
        note_type: obs
            .code
            .as_ref()
            .and_then(|c| c.display())
            .unwrap_or("Observation Note")
            .to_string(),
        authoring_party: obs
            .performer
            .first()
            .and_then(|p| p.display.clone())
            .unwrap_or_else(|| UNKNOWN.to_string()),
        timestamp: obs
            .effective_date_time
            .clone()
            .or_else(|| obs.issued.clone()),
        organization: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_bundle(json: &str) -> Bundle {
        serde_json::from_str(json).unwrap()
    }

    fn encode(text: &str) -> String {
        BASE64.encode(text)
    }

    #[test]
    fn bundle_without_patient_yields_nothing() {
        let bundle = parse_bundle(
            r#"{"resourceType": "Bundle", "id": "b1", "entry": [
                {"resource": {"resourceType": "DiagnosticReport", "id": "r1",
                    "text": {"div": "<div>Findings unremarkable.</div>"}}}
            ]}"#,
        );
        assert!(extract_notes(&bundle).is_empty());
    }

    #[test]
    fn document_reference_decodes_attachment() {
        let data = encode("Patient presents with uncontrolled diabetes.");
        let json = format!(
            r#"{{"resourceType": "Bundle", "id": "b1", "entry": [
                {{"resource": {{"resourceType": "Patient", "id": "p1"}}}},
                {{"resource": {{"resourceType": "DocumentReference", "id": "d1",
                    "date": "2022-07-01T09:30:00Z",
                    "type": {{"text": "Progress note"}},
                    "author": [{{"display": "Dr. Okafor"}}],
                    "custodian": {{"display": "Lakeside Clinic"}},
                    "content": [{{"attachment": {{"contentType": "text/plain", "data": "{}"}}}}]}}}}
            ]}}"#,
            data
        );
        let notes = extract_notes(&parse_bundle(&json));
        assert_eq!(notes.len(), 1);
        let note = &notes[0];
        assert_eq!(note.note_id, "d1");
        assert_eq!(note.subject_id, "p1");
        assert_eq!(note.source_bundle_id, "b1");
        assert_eq!(note.raw_text, "Patient presents with uncontrolled diabetes.");
        assert_eq!(note.note_type, "Progress note");
        assert_eq!(note.authoring_party, "Dr. Okafor");
        assert_eq!(note.timestamp.as_deref(), Some("2022-07-01T09:30:00Z"));
        assert_eq!(note.organization.as_deref(), Some("Lakeside Clinic"));
    }

    #[test]
    fn diagnostic_report_uses_narrative_and_fallbacks() {
        let bundle = parse_bundle(
            r#"{"resourceType": "Bundle", "id": "b1", "entry": [
                {"resource": {"resourceType": "Patient", "id": "p1"}},
                {"resource": {"resourceType": "DiagnosticReport", "id": "r1",
                    "issued": "2021-11-20T08:00:00Z",
                    "text": {"div": "<div>CBC within normal limits.</div>"}}}
            ]}"#,
        );
        let notes = extract_notes(&bundle);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].note_type, "DiagnosticReport");
        assert_eq!(notes[0].authoring_party, "Unknown");
        assert_eq!(notes[0].timestamp.as_deref(), Some("2021-11-20T08:00:00Z"));
        assert!(notes[0].raw_text.contains("CBC within normal limits."));
    }

    #[test]
    fn effective_time_preferred_over_issued() {
        let bundle = parse_bundle(
            r#"{"resourceType": "Bundle", "id": "b1", "entry": [
                {"resource": {"resourceType": "Patient", "id": "p1"}},
                {"resource": {"resourceType": "DiagnosticReport", "id": "r1",
                    "effectiveDateTime": "2021-11-19T10:00:00Z",
                    "issued": "2021-11-20T08:00:00Z",
                    "text": {"div": "Lipid panel reviewed with patient."}}}
            ]}"#,
        );
        let notes = extract_notes(&bundle);
        assert_eq!(notes[0].timestamp.as_deref(), Some("2021-11-19T10:00:00Z"));
    }

    #[test]
    fn observation_joins_annotations() {
        let bundle = parse_bundle(
            r#"{"resourceType": "Bundle", "id": "b1", "entry": [
                {"resource": {"resourceType": "Patient", "id": "p1"}},
                {"resource": {"resourceType": "Observation", "id": "o1",
                    "performer": [{"display": "Nurse Patel"}],
                    "note": [{"text": "Tolerating diet well."}, {"text": "Ambulating without assistance."}]}},
                {"resource": {"resourceType": "Observation", "id": "o2", "note": []}}
            ]}"#,
        );
        let notes = extract_notes(&bundle);
        assert_eq!(notes.len(), 1);
        assert_eq!(
            notes[0].raw_text,
            "Tolerating diet well.\nAmbulating without assistance."
        );
        assert_eq!(notes[0].note_type, "Observation Note");
        assert_eq!(notes[0].authoring_party, "Nurse Patel");
    }

    #[test]
    fn malformed_resource_does_not_lose_siblings() {
        let good = encode("Wound check: incision clean, dry, and intact.");
        let json = format!(
            r#"{{"resourceType": "Bundle", "id": "b1", "entry": [
                {{"resource": {{"resourceType": "Patient", "id": "p1"}}}},
                {{"resource": {{"resourceType": "DocumentReference", "id": "bad",
                    "content": [{{"attachment": {{"data": "!!!not-base64!!!"}}}}]}}}},
                {{"resource": {{"resourceType": "DocumentReference", "id": "good",
                    "content": [{{"attachment": {{"data": "{}"}}}}]}}}}
            ]}}"#,
            good
        );
        let notes = extract_notes(&parse_bundle(&json));
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].note_id, "good");
    }

    #[test]
    fn resources_without_text_are_skipped() {
        let bundle = parse_bundle(
            r#"{"resourceType": "Bundle", "id": "b1", "entry": [
                {"resource": {"resourceType": "Patient", "id": "p1"}},
                {"resource": {"resourceType": "DocumentReference", "id": "d1", "content": []}},
                {"resource": {"resourceType": "DiagnosticReport", "id": "r1"}},
                {"resource": {"resourceType": "MedicationRequest", "id": "m1"}}
            ]}"#,
        );
        assert!(extract_notes(&bundle).is_empty());
    }

    #[test]
    fn missing_resource_id_synthesizes_placeholder() {
        let bundle = parse_bundle(
            r#"{"resourceType": "Bundle", "id": "b1", "entry": [
                {"resource": {"resourceType": "Patient", "id": "p1"}},
                {"resource": {"resourceType": "DiagnosticReport",
                    "text": {"div": "Chest radiograph shows clear lung fields bilaterally."}}}
            ]}"#,
        );
        let notes = extract_notes(&bundle);
        assert_eq!(notes[0].note_id, "note-1");
    }

    #[test]
    fn defaults_to_unknown_type_and_author() {
        let data = encode("Telephone encounter: medication refill authorized for 90 days.");
        let json = format!(
            r#"{{"resourceType": "Bundle", "id": "b1", "entry": [
                {{"resource": {{"resourceType": "Patient", "id": "p1"}}}},
                {{"resource": {{"resourceType": "DocumentReference", "id": "d1",
                    "content": [{{"attachment": {{"data": "{}"}}}}]}}}}
            ]}}"#,
            data
        );
        let notes = extract_notes(&parse_bundle(&json));
        assert_eq!(notes[0].note_type, "DocumentReference");
        assert_eq!(notes[0].authoring_party, "Unknown");
        assert!(notes[0].timestamp.is_none());
    }
}
