//! Line-oriented share format for snippet lists
//!
//! One snippet per line: `HH:MM:SS, HH:MM:SS, name`.

use crate::regions::Region;
use crate::time_codec::{seconds_to_timestamp, timestamp_to_seconds};
use chardetng::EncodingDetector;
use nom::{
    bytes::complete::take_till,
    character::complete::char,
    combinator::all_consuming,
    sequence::{terminated, tuple},
    IResult,
};
use tracing::{debug, warn};

/// A snippet read from one line of share text
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSnippet {
    /// 1-based line number in the input
    pub line_number: usize,
    pub start: f64,
    pub end: f64,
    pub name: String,
}

/// A line that was not imported, and why
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedLine {
    pub line_number: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedSnippets {
    pub snippets: Vec<ParsedSnippet>,
    pub skipped: Vec<SkippedLine>,
}

fn field(input: &str) -> IResult<&str, &str> {
    take_till(|c: char| c == ',')(input)
}

/// Exactly three comma-separated fields
fn snippet_line(input: &str) -> IResult<&str, (&str, &str, &str)> {
    all_consuming(tuple((
        terminated(field, char(',')),
        terminated(field, char(',')),
        field,
    )))(input)
}

/// Parse share text into snippets
///
/// Blank lines are ignored. Lines without exactly three fields are skipped
/// and reported; the rest of the batch still imports. Timestamps that do not
/// parse read as zero, matching form input behaviour.
pub fn parse_snippets(text: &str) -> ParsedSnippets {
    let mut parsed = ParsedSnippets::default();

    for (index, raw_line) in text.lines().enumerate() {
        let line_number = index + 1;
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        match snippet_line(line) {
            Ok((_, (start, end, name))) => parsed.snippets.push(ParsedSnippet {
                line_number,
                start: timestamp_to_seconds(start.trim()),
                end: timestamp_to_seconds(end.trim()),
                name: name.trim().to_string(),
            }),
            Err(_) => {
                let fields = line.split(',').count();
                debug!("Skipping line {}: {} fields", line_number, fields);
                parsed.skipped.push(SkippedLine {
                    line_number,
                    reason: format!("expected 3 comma-separated fields, found {}", fields),
                });
            }
        }
    }

    parsed
}

/// Render regions as share text, one line each, no trailing newline
pub fn format_snippets<'a>(regions: impl IntoIterator<Item = &'a Region>) -> String {
    regions
        .into_iter()
        .map(|region| {
            format!(
                "{}, {}, {}",
                seconds_to_timestamp(region.start),
                seconds_to_timestamp(region.end),
                region.label
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decode a share-text file of unknown encoding
pub fn decode_text(bytes: &[u8]) -> String {
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);

    let (decoded, _, had_errors) = encoding.decode(bytes);

    if had_errors {
        warn!(
            "Decoding errors occurred while reading snippet text as {}",
            encoding.name()
        );
    }

    decoded.into_owned()
}
