//! Step label derivation.
//!
//! Labels drop ordinal decorations ("Step 07:", "3.", bare numbers) and
//! markdown emphasis so cosmetic authoring differences change neither the
//! displayed label nor the chain identity derived from it.

use std::sync::OnceLock;

use regex::Regex;

use super::sections::{FenceTracker, Segment, heading};

fn ordinal_prefix() -> &'static Regex {
    static ORDINAL: OnceLock<Regex> = OnceLock::new();
    ORDINAL.get_or_init(|| {
        Regex::new(r"(?i)^(?:step\s*#?\s*)?\d+(?:\.\d+)*(?:\s*[:.)\-–—]\s*|\s+|$)")
            .expect("valid ordinal prefix regex")
    })
}

/// Normalize a raw heading or line into a display label.
#[must_use]
pub fn normalize_label(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some((_, heading_text)) = heading(text) {
        text = heading_text;
    }
    let text = text
        .trim_start_matches(['-', '*', '+'])
        .replace("**", "")
        .replace("__", "")
        .replace('`', "");
    let text = text.trim().trim_matches(['*', '_']).trim();

    let stripped = ordinal_prefix().replace(text, "");
    let stripped = stripped.trim().trim_end_matches(':').trim();
    let chosen = if stripped.is_empty() {
        text.trim_end_matches(':').trim()
    } else {
        stripped
    };

    chosen.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Label for a segment: its heading, else its first non-blank line outside a fence.
pub(crate) fn derive_label(segment: &Segment<'_>) -> Option<String> {
    let raw = match segment.heading {
        Some(text) => Some(text),
        None => {
            let mut fences = FenceTracker::default();
            segment
                .lines
                .iter()
                .copied()
                .find(|line| !fences.observe(line) && !line.trim().is_empty())
        }
    }?;
    let label = normalize_label(raw);
    (!label.is_empty()).then_some(label)
}
