//! Fence-aware splitting of a document into chain sections and step segments.
//!
//! Level-1 ATX headings start a chain, level-2 headings start a step. Headings
//! inside fenced code blocks are content, not structure.

/// One step's worth of source lines.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct Segment<'a> {
    /// Heading text when the segment starts with a heading line.
    pub heading: Option<&'a str>,
    pub lines: Vec<&'a str>,
}

impl Segment<'_> {
    pub fn is_blank(&self) -> bool {
        self.heading.is_none() && self.lines.iter().all(|line| line.trim().is_empty())
    }
}

/// A chain's lead segment plus its subsections, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct ChainSection<'a> {
    pub lead: Segment<'a>,
    pub subsections: Vec<Segment<'a>>,
}

impl<'a> ChainSection<'a> {
    /// Step segments: the lead when it says anything, then each subsection.
    pub fn step_segments(&self) -> Vec<&Segment<'a>> {
        let lead = (!self.lead.is_blank()).then_some(&self.lead);
        lead.into_iter().chain(self.subsections.iter()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fence {
    marker: char,
    width: usize,
}

/// Tracks whether the scanner is inside a fenced code block.
#[derive(Debug, Default)]
pub(crate) struct FenceTracker {
    open: Option<Fence>,
}

impl FenceTracker {
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Feed one line. Returns true when the line is fence syntax or fenced content.
    pub fn observe(&mut self, line: &str) -> bool {
        let fence = fence_marker(line);
        match (self.open, fence) {
            (None, Some(fence)) => {
                self.open = Some(fence);
                true
            }
            (Some(open), Some(fence))
                if fence.marker == open.marker
                    && fence.width >= open.width
                    && line.trim_start().trim_start_matches(open.marker).trim().is_empty() =>
            {
                self.open = None;
                true
            }
            (Some(_), _) => true,
            (None, None) => false,
        }
    }
}

fn fence_marker(line: &str) -> Option<Fence> {
    let trimmed = line.trim_start();
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let marker = trimmed.chars().next()?;
    if marker != '`' && marker != '~' {
        return None;
    }
    let width = trimmed.chars().take_while(|c| *c == marker).count();
    (width >= 3).then_some(Fence { marker, width })
}

/// ATX heading level and text, if `line` is a heading.
pub(crate) fn heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if !(1..=6).contains(&level) {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }
    let text = rest.trim().trim_end_matches('#').trim_end();
    Some((level, text))
}

/// Split a document into chain sections.
///
/// Text before the first level-1 heading is dropped when the document has
/// level-1 headings; a document without any is a single chain.
pub(crate) fn split_document(document: &str) -> Vec<ChainSection<'_>> {
    let mut fences = FenceTracker::default();
    let mut chains: Vec<ChainSection<'_>> = Vec::new();
    let mut preface = ChainSection::default();
    let mut saw_title = false;

    for line in document.lines() {
        let structural = if fences.observe(line) {
            None
        } else {
            heading(line).filter(|(level, _)| *level <= 2)
        };

        match structural {
            Some((1, text)) => {
                saw_title = true;
                chains.push(ChainSection {
                    lead: Segment {
                        heading: Some(text),
                        lines: vec![line],
                    },
                    subsections: Vec::new(),
                });
            }
            Some((_, text)) => {
                let current = chains.last_mut().unwrap_or(&mut preface);
                current.subsections.push(Segment {
                    heading: Some(text),
                    lines: vec![line],
                });
            }
            None => {
                let current = chains.last_mut().unwrap_or(&mut preface);
                match current.subsections.last_mut() {
                    Some(segment) => segment.lines.push(line),
                    None => current.lead.lines.push(line),
                }
            }
        }
    }

    if !saw_title {
        return vec![preface];
    }
    if !preface.lead.is_blank() || !preface.subsections.is_empty() {
        tracing::debug!("Ignoring text before the first chain title");
    }
    chains
}
