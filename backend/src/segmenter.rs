//! Document segmentation
//!
//! Walks the lines of one document in order, keeps track of the current
//! section (phẩm) and sub-scripture (kinh), and closes a segment every time a
//! boundary is reached: a new heading, a delimiter, or the end of input.
//!
//! The fold is single-pass without lookahead. Each `Segmenter` owns its
//! `ParseState`, so documents can be segmented on separate threads.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classifier::{is_delimiter, Classifier};
use crate::roman::resolve_numeral;
use crate::types::{Classification, DivisionMode, Segment, SectionKind, SegmentedDocument};

/// Preset option sets for the two header dialects found in the source documents
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// No preamble. Numbered lines are sub-scripture headings. Documents
    /// without any heading are named after the document.
    #[default]
    Permissive,
    /// Everything before the first delimiter (usually a table of contents)
    /// is discarded. Only KINH headings are sub-scripture headings.
    Preamble,
}

impl Dialect {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "permissive" => Some(Dialect::Permissive),
            "preamble" => Some(Dialect::Preamble),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Permissive => "permissive",
            Dialect::Preamble => "preamble",
        }
    }

    pub fn options(&self) -> SegmenterOptions {
        match self {
            Dialect::Permissive => SegmenterOptions {
                skip_preamble: false,
                retain_header_lines: true,
                permissive_sub_headers: true,
                untitled_fallback: true,
            },
            Dialect::Preamble => SegmenterOptions {
                skip_preamble: true,
                retain_header_lines: true,
                permissive_sub_headers: false,
                untitled_fallback: false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmenterOptions {
    /// Discard lines until the first delimiter has been seen.
    pub skip_preamble: bool,
    /// Keep heading lines as the first content line of the segment they open.
    pub retain_header_lines: bool,
    /// Read "<digits>. text" lines as sub-scripture headings.
    pub permissive_sub_headers: bool,
    /// Without any heading in the document, name the sub-scripture after the
    /// document itself, with index 1.
    pub untitled_fallback: bool,
}

impl Default for SegmenterOptions {
    fn default() -> Self {
        Dialect::default().options()
    }
}

/// Mutable fold accumulator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseState {
    pub current_section_title: Option<String>,
    pub current_section_index: u32,
    pub current_subscripture_title: Option<String>,
    pub current_subscripture_index: u32,
    pub buffer: Vec<String>,
    pub seen_section_structure: bool,
    pub seen_subscripture_structure: bool,
    pub past_preamble: bool,
}

/// A segment closed during the pass, before the division mode is known
#[derive(Debug, Clone, PartialEq, Eq)]
struct ClosedSegment {
    section_title: Option<String>,
    section_index: u32,
    subscripture_title: Option<String>,
    subscripture_index: u32,
    content: Vec<String>,
}

pub struct Segmenter {
    options: SegmenterOptions,
    classifier: Classifier,
    document_title: Option<String>,
    state: ParseState,
    closed: Vec<ClosedSegment>,
}

/// "PHẨM IV: Tên" or "PHẨM IV"
pub fn format_section_title(kind: SectionKind, number: &str, title: Option<&str>) -> String {
    match title {
        Some(t) if !t.trim().is_empty() => format!("{} {}: {}", kind, number.to_uppercase(), t.trim()),
        _ => format!("{} {}", kind, number.to_uppercase()),
    }
}

impl Segmenter {
    pub fn new(options: SegmenterOptions) -> Self {
        Segmenter {
            options,
            classifier: Classifier::new(options.permissive_sub_headers),
            document_title: None,
            state: ParseState::default(),
            closed: Vec::new(),
        }
    }

    /// Display name used by the untitled fallback.
    pub fn with_document_title(mut self, title: &str) -> Self {
        self.document_title = Some(title.to_string());
        self
    }

    pub fn state(&self) -> &ParseState {
        &self.state
    }

    /// Consume one line.
    pub fn push_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }

        match self.classifier.classify(line) {
            Classification::Delimiter => {
                if !self.state.past_preamble {
                    self.state.past_preamble = true;
                    if self.options.skip_preamble {
                        debug!("First delimiter found, main content starts");
                    }
                }
                self.close_segment();
            }

            _ if self.options.skip_preamble && !self.state.past_preamble => {}

            Classification::SectionHeader { kind, number, title, text } => {
                self.close_segment();

                let index = match resolve_numeral(&number) {
                    Some(n) => n,
                    None => {
                        let fallback = self.state.current_section_index.saturating_add(1);
                        warn!("Can't resolve section number '{}' in '{}', using {}", number, text, fallback);
                        fallback
                    }
                };

                let section_title = format_section_title(kind, &number, title.as_deref());
                debug!("Section: {}", section_title);

                self.state.current_section_index = index;
                self.state.current_section_title = Some(section_title);
                self.state.current_subscripture_title = None;
                self.state.current_subscripture_index = 0;
                self.state.seen_section_structure = true;

                if self.options.retain_header_lines {
                    self.state.buffer.push(text);
                }
            }

            Classification::SubHeader { text, .. } => {
                self.close_segment();

                debug!("Sub-scripture: {}", text);

                self.state.current_subscripture_index += 1;
                self.state.current_subscripture_title = Some(text.clone());
                self.state.seen_subscripture_structure = true;

                if self.options.retain_header_lines {
                    self.state.buffer.push(text);
                }
            }

            Classification::Content(text) => {
                self.state.buffer.push(text);
            }
        }
    }

    /// Close the current segment if there is content left after removing
    /// delimiter lines. The buffer is always cleared.
    fn close_segment(&mut self) {
        let content: Vec<String> = self.state.buffer
            .drain(..)
            .filter(|line| !is_delimiter(line))
            .collect();

        if content.is_empty() {
            return;
        }

        self.closed.push(ClosedSegment {
            section_title: self.state.current_section_title.clone(),
            section_index: self.state.current_section_index,
            subscripture_title: self.state.current_subscripture_title.clone(),
            subscripture_index: self.state.current_subscripture_index,
            content,
        });
    }

    /// End of input: close the last segment and apply the document-wide
    /// division mode.
    pub fn finish(mut self) -> SegmentedDocument {
        self.close_segment();

        if self.options.skip_preamble && !self.state.past_preamble {
            warn!("No o0o delimiter found, the whole document was read as preamble");
        }

        let division_mode = DivisionMode::from_flags(
            self.state.seen_section_structure,
            self.state.seen_subscripture_structure,
        );

        let fallback_title = if self.options.untitled_fallback && division_mode == DivisionMode::Undetermined {
            self.document_title.clone()
        } else {
            None
        };

        let segments = self.closed
            .into_iter()
            .map(|c| {
                let (subscripture_title, subscripture_index) = match &fallback_title {
                    Some(t) => (Some(t.clone()), 1),
                    None => (c.subscripture_title, c.subscripture_index),
                };
                Segment {
                    section_title: c.section_title,
                    section_index: c.section_index,
                    subscripture_title,
                    subscripture_index,
                    content: c.content,
                    division_mode,
                }
            })
            .collect();

        SegmentedDocument { segments, division_mode }
    }
}

/// Segment a whole document in one call.
pub fn segment_lines<I, S>(lines: I, options: &SegmenterOptions, document_title: Option<&str>) -> SegmentedDocument
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut segmenter = Segmenter::new(*options);
    if let Some(title) = document_title {
        segmenter = segmenter.with_document_title(title);
    }
    for line in lines {
        segmenter.push_line(line.as_ref());
    }
    segmenter.finish()
}
