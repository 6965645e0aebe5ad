//! Template-aware note cleaning.
//!
//! Synthetic clinical documents interleave genuine narrative with unanswered
//! template prompts and AI meta-commentary. Cleaning runs as a fixed sequence
//! of stages, each of which may short-circuit to rejection:
//!
//! 1. pre-length gate on the trimmed raw text
//! 2. markup strip (tolerant of malformed HTML)
//! 3. whole-note rejection on pure-template marker phrases
//! 4. ordered artifact rules, each substituting a single space
//! 5. whitespace normalization (always last)
//! 6. post-length gate on the cleaned text — the binding gate
//!
//! Rejection is an expected, frequent outcome, not an error. Stage 3 makes
//! the "discard whole note" call; stage 4 excises substrings from mixed notes
//! that still carry clinical signal.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

use crate::config::SanitizerConfig;

/// Why a note was discarded. Rendered into logs and run summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    TooShort,
    PureTemplate,
    TooShortAfterCleaning,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::TooShort => write!(f, "too short"),
            RejectReason::PureTemplate => write!(f, "pure template"),
            RejectReason::TooShortAfterCleaning => write!(f, "too short after cleaning"),
        }
    }
}

/// Exact phrases that mark the entire note as unfilled scaffolding or
/// AI-generated framing with no clinical signal. Any hit rejects the note
/// outright, regardless of what else it contains.
const TEMPLATE_MARKERS: &[&str] = &[
    "here is a medical note template",
    "Here is a sample medical note",
    "list any specific symptoms",
    "please fill in the details",
    "This template is intended to be completed",
];

/// Exact boilerplate sentences with no clinical content. Removed as
/// substrings; the rest of the note survives.
const JUNK_SENTENCES: &[&str] = &[
    "The patient reports no specific complaints at this time.",
    "General examination of patient for .",
    "No additional information was provided.",
    "Please refer to the attached documentation for further details.",
];

/// One ordered substitution in the artifact chain. Every match is replaced
/// with a single space, never deleted, so adjacent words cannot fuse.
struct CleanRule {
    name: &'static str,
    re: Regex,
}

static CLEAN_RULES: LazyLock<Vec<CleanRule>> = LazyLock::new(|| {
    // Order matters: rest-of-string removals run before token-level rules so
    // a disclaimer's markdown never leaks back into the kept text.
    [
        // "[Insert Date]", "[Patient Name]", and friends.
        ("bracketed_placeholder", r"\[[^\[\]]*\]"),
        // Instructions to the note-writer, not findings: "(If known, e.g. ...)".
        (
            "parenthetical_instruction",
            r"(?i)\((?:if known|document any|example|e\.g\.|i\.e\.|describe|include any|list any|note any)[^()]*\)",
        ),
        // Conversational acknowledgement openers.
        ("ai_preamble_ack", r"(?i)^(?:okay|sure|certainly|of course)[,.!]?\s+"),
        // "Here is the completed note for ...:" lead-ins.
        ("ai_preamble_leadin", r"(?i)^here(?:'s| is) (?:a|the|your) [^:\n]{0,80}:\s*"),
        // Once AI self-reference starts, nothing after it is clinical.
        (
            "ai_commentary",
            r"(?i)(?:as an ai language model|i am an ai|i cannot provide medical advice|note that this is a fictional)[\s\S]*$",
        ),
        (
            "ai_followup",
            r"(?i)(?:i hope this (?:helps|is helpful)|let me know if you(?:'d| would)? like)[\s\S]*$",
        ),
        (
            "disclaimer_footer",
            r"(?i)(?:disclaimer:|this (?:note|document|template) is for (?:educational|informational|illustrative) purposes)[\s\S]*$",
        ),
        // Emphasis, heading, and rule tokens left over from markdown output.
        ("markdown_tokens", r"\*\*|__|={3,}|-{3,}|#{1,6}\s|[*_]"),
        // A capitalized (possibly multi-word) label whose only value is a
        // period: "Constitutional: .", "Review of Systems: .".
        (
            "empty_field",
            r"\b[A-Z][A-Za-z]*(?: [A-Za-z]+){0,5}:\s*\.(?:\s|$)",
        ),
    ]
    .into_iter()
    .map(|(name, pattern)| CleanRule {
        name,
        re: Regex::new(pattern).unwrap_or_else(|e| panic!("bad rule {}: {}", name, e)),
    })
    .collect()
});

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^<>]*>").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Clean raw note text, or explain why it was discarded.
pub fn sanitize(raw: &str, cfg: &SanitizerConfig) -> Result<String, RejectReason> {
    let trimmed = raw.trim();
    if trimmed.chars().count() < cfg.min_raw_chars {
        return Err(RejectReason::TooShort);
    }

    let stripped = strip_markup(trimmed);

    if TEMPLATE_MARKERS.iter().any(|m| stripped.contains(m)) {
        return Err(RejectReason::PureTemplate);
    }

    let mut text = stripped;
    for rule in CLEAN_RULES.iter() {
        let replaced = rule.re.replace_all(&text, " ");
        if replaced != text {
            tracing::trace!(rule = rule.name, "artifact rule fired");
            text = replaced.into_owned();
        }
    }
    for junk in JUNK_SENTENCES {
        if text.contains(junk) {
            text = text.replace(junk, " ");
        }
    }

    let clean = WS_RE.replace_all(&text, " ").trim().to_string();

    if clean.chars().count() < cfg.min_clean_chars {
        return Err(RejectReason::TooShortAfterCleaning);
    }

    Ok(clean)
}

/// Remove HTML-ish tags and decode the common entities. Malformed or partial
/// markup is tolerated: anything that does not look like a tag passes through
/// as plain text.
fn strip_markup(text: &str) -> String {
    let no_tags = TAG_RE.replace_all(text, " ");
    no_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
}
