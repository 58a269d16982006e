//! Prometheus text format parser
//!
//! This module provides a parser for the Prometheus text exposition format.
//! <https://github.com/prometheus/docs/blob/main/content/docs/instrumenting/exposition_formats.md>
//!
//! Parsing never fails. Every physical line becomes a [`Line`]: family
//! metadata, a [`Sample`], or a [`Skip`] naming why the line carried nothing
//! usable. [`parse_text`] folds those lines into an [`Exposition`]. A bad
//! label pair costs only that pair, a bad line costs only that line.

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::snapshot::{Family, Labels, MetricType, Sample};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Family metadata carried by a `# HELP` or `# TYPE` comment line
pub enum Metadata {
    /// `# HELP <name> <text>`
    Help {
        /// The family name
        name: String,
        /// The unescaped help text
        text: String,
    },
    /// `# TYPE <name> <type>`
    Type {
        /// The family name
        name: String,
        /// The declared metric type
        metric_type: MetricType,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Reasons a line produced neither metadata nor a sample
pub enum Skip {
    /// Empty or whitespace-only line
    Blank,
    /// A comment that is not `HELP` or `TYPE`
    Comment,
    /// A `HELP` or `TYPE` line without a valid name, or with an unknown type
    BadMetadata,
    /// The metric name does not match `[a-zA-Z_:][a-zA-Z0-9_:]*`
    InvalidName,
    /// A label block was opened but never closed
    UnclosedLabels,
    /// No value follows the name and labels
    MissingValue,
    /// The value is not a float nor one of the special values
    InvalidValue,
    /// The field after the value is not an integer timestamp
    InvalidTimestamp,
    /// Unexpected fields follow the timestamp
    TrailingFields,
}

impl Skip {
    /// Whether this skip stems from malformed input rather than a comment
    /// or blank line.
    #[must_use]
    pub fn is_malformed(self) -> bool {
        !matches!(self, Self::Blank | Self::Comment)
    }
}

#[derive(Debug, Clone, PartialEq)]
/// The outcome of parsing one physical line
pub enum Line {
    /// Metadata for a family; produces no sample
    Metadata(Metadata),
    /// A data line
    Sample(Sample),
    /// Nothing usable on this line
    Skipped(Skip),
}

#[derive(Debug, Clone, Default, PartialEq)]
/// All samples and family metadata of an exposition text, in source order
pub struct Exposition {
    /// Samples in the order their lines appeared
    pub samples: Vec<Sample>,
    /// Family metadata keyed by family name
    pub families: FxHashMap<String, Family>,
    /// Number of malformed lines dropped
    pub malformed: usize,
}

impl Exposition {
    /// Fold one parsed [`Line`] into this exposition.
    ///
    /// Later metadata for a family replaces earlier metadata of the same
    /// kind.
    #[must_use]
    pub fn apply(mut self, line: Line) -> Self {
        match line {
            Line::Metadata(Metadata::Help { name, text }) => {
                self.families.entry(name).or_default().help = Some(text);
            }
            Line::Metadata(Metadata::Type { name, metric_type }) => {
                self.families.entry(name).or_default().metric_type = Some(metric_type);
            }
            Line::Sample(sample) => self.samples.push(sample),
            Line::Skipped(skip) => {
                if skip.is_malformed() {
                    self.malformed += 1;
                }
            }
        }
        self
    }
}

/// Parse a complete Prometheus text format response
#[must_use]
pub fn parse_text(text: &str) -> Exposition {
    let exposition = text
        .lines()
        .map(parse_line)
        .fold(Exposition::default(), Exposition::apply);
    debug!(
        samples = exposition.samples.len(),
        families = exposition.families.len(),
        malformed = exposition.malformed,
        "parsed exposition text"
    );
    exposition
}

/// Parse a single line of Prometheus text format
#[must_use]
pub fn parse_line(line: &str) -> Line {
    let line = line.trim();

    if line.is_empty() {
        return Line::Skipped(Skip::Blank);
    }

    let parsed = if let Some(comment) = line.strip_prefix('#') {
        parse_comment(comment)
    } else {
        match parse_sample(line) {
            Ok(sample) => Line::Sample(sample),
            Err(skip) => Line::Skipped(skip),
        }
    };

    if let Line::Skipped(skip) = parsed {
        if skip.is_malformed() {
            trace!(?skip, line, "skipping malformed line");
        }
    }
    parsed
}

fn parse_comment(comment: &str) -> Line {
    let (keyword, rest) = split_token(comment);
    match keyword {
        "HELP" => {
            let (name, text) = split_token(rest);
            if !is_metric_name(name) {
                return Line::Skipped(Skip::BadMetadata);
            }
            Line::Metadata(Metadata::Help {
                name: name.to_string(),
                text: unescape_help(text),
            })
        }
        "TYPE" => {
            let (name, kind) = split_token(rest);
            if !is_metric_name(name) {
                return Line::Skipped(Skip::BadMetadata);
            }
            match kind.parse::<MetricType>() {
                Ok(metric_type) => Line::Metadata(Metadata::Type {
                    name: name.to_string(),
                    metric_type,
                }),
                Err(_) => Line::Skipped(Skip::BadMetadata),
            }
        }
        _ => Line::Skipped(Skip::Comment),
    }
}

/// Split the first whitespace-delimited token off `s`.
fn split_token(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(idx) => (&s[..idx], s[idx..].trim_start()),
        None => (s, ""),
    }
}

fn unescape_help(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => result.push('\\'),
            Some('n') => result.push('\n'),
            Some(c) => {
                result.push('\\');
                result.push(c);
            }
            None => result.push('\\'),
        }
    }

    result
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

/// Metric names follow `[a-zA-Z_:][a-zA-Z0-9_:]*`.
fn is_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_' || first == ':') && chars.all(is_name_char)
        }
        None => false,
    }
}

/// Label names follow `[a-zA-Z_][a-zA-Z0-9_]*`.
fn is_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

fn parse_sample(line: &str) -> Result<Sample, Skip> {
    let name_end = line.find(|c: char| !is_name_char(c)).unwrap_or(line.len());
    let (name, rest) = line.split_at(name_end);
    if !is_metric_name(name) {
        return Err(Skip::InvalidName);
    }

    let (labels, rest) = if let Some(block) = rest.strip_prefix('{') {
        let (inner, after) = split_label_block(block).ok_or(Skip::UnclosedLabels)?;
        (parse_labels(inner), after)
    } else if rest.is_empty() {
        return Err(Skip::MissingValue);
    } else if rest.starts_with(char::is_whitespace) {
        (Labels::new(), rest)
    } else {
        // Something like `bad-name 1`: the name ran into a character that
        // cannot appear in it.
        return Err(Skip::InvalidName);
    };

    let value = parse_value_and_timestamp(rest)?;

    Ok(Sample {
        name: name.to_string(),
        labels,
        value,
    })
}

/// Find the end of a label block, `block` being the text after its `{`.
///
/// The block ends at the first `}` outside a quoted value. When a quote is
/// left open the last `}` on the line closes the block instead, which leaves
/// the pair with the open quote to be dropped by [`parse_labels`].
fn split_label_block(block: &str) -> Option<(&str, &str)> {
    let mut in_quote = false;
    let mut escaped = false;

    for (idx, ch) in block.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quote => escaped = true,
            '"' => in_quote = !in_quote,
            '}' if !in_quote => return Some((&block[..idx], &block[idx + 1..])),
            _ => {}
        }
    }

    if in_quote {
        let idx = block.rfind('}')?;
        return Some((&block[..idx], &block[idx + 1..]));
    }
    None
}

fn parse_labels(block: &str) -> Labels {
    let mut labels = Labels::new();
    let mut rest = block;

    loop {
        rest = rest.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
        if rest.is_empty() {
            break;
        }
        let (pair, remainder) = parse_label_pair(rest);
        match pair {
            Some((key, value)) => {
                labels.insert(key, value);
            }
            None => trace!(pair = &rest[..rest.len() - remainder.len()], "dropping label pair"),
        }
        rest = remainder;
    }

    labels
}

/// Parse one `key="value"` pair from the front of `input`.
///
/// Returns the pair if it is well formed, and always the unconsumed
/// remainder so the caller can move on to the next pair.
fn parse_label_pair(input: &str) -> (Option<(String, String)>, &str) {
    let Some(delim) = input.find(['=', ',']) else {
        return (None, "");
    };
    if input[delim..].starts_with(',') {
        return (None, &input[delim + 1..]);
    }

    let key = input[..delim].trim();
    let after_eq = input[delim + 1..].trim_start();

    let Some(quoted) = after_eq.strip_prefix('"') else {
        return (None, skip_to_comma(after_eq));
    };
    let (value, remainder) = read_quoted(quoted);

    if !is_label_name(key) {
        return (None, remainder);
    }
    (value.map(|value| (key.to_string(), value)), remainder)
}

/// Read a quoted label value, `input` being the text after the opening
/// quote.
///
/// Handles `\"`, `\\` and `\n`. Any other escape leaves the value invalid
/// but the scan still runs to the closing quote. An unterminated value
/// consumes the rest of the block.
fn read_quoted(input: &str) -> (Option<String>, &str) {
    let mut result = String::with_capacity(input.len());
    let mut valid = true;
    let mut chars = input.char_indices();

    while let Some((idx, ch)) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some((_, '\\')) => result.push('\\'),
                Some((_, '"')) => result.push('"'),
                Some((_, 'n')) => result.push('\n'),
                Some(_) => valid = false,
                None => return (None, ""),
            },
            '"' => {
                let remainder = &input[idx + 1..];
                return (valid.then_some(result), remainder);
            }
            _ => result.push(ch),
        }
    }

    (None, "")
}

/// Return the text after the first comma outside a quoted value.
fn skip_to_comma(input: &str) -> &str {
    let mut in_quote = false;
    let mut escaped = false;

    for (idx, ch) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quote => escaped = true,
            '"' => in_quote = !in_quote,
            ',' if !in_quote => return &input[idx + 1..],
            _ => {}
        }
    }
    ""
}

fn parse_value_and_timestamp(value_str: &str) -> Result<f64, Skip> {
    // OpenMetrics exemplars trail the sample after ` # `.
    let fields = value_str
        .split_once(" #")
        .map_or(value_str, |(fields, _exemplar)| fields);
    let mut parts = fields.split_whitespace();

    let value_part = parts.next().ok_or(Skip::MissingValue)?;
    let value = parse_float(value_part).ok_or(Skip::InvalidValue)?;

    // The timestamp is validated but not retained; a snapshot holds current
    // values only.
    if let Some(ts_str) = parts.next() {
        ts_str.parse::<i64>().map_err(|_| Skip::InvalidTimestamp)?;
    }
    if parts.next().is_some() {
        return Err(Skip::TrailingFields);
    }

    Ok(value)
}

/// Parse a sample value, including the special values `+Inf`, `-Inf` and
/// `NaN` in any case.
fn parse_float(token: &str) -> Option<f64> {
    if token.eq_ignore_ascii_case("+inf") || token.eq_ignore_ascii_case("inf") {
        Some(f64::INFINITY)
    } else if token.eq_ignore_ascii_case("-inf") {
        Some(f64::NEG_INFINITY)
    } else if token.eq_ignore_ascii_case("nan") {
        Some(f64::NAN)
    } else {
        token.parse::<f64>().ok()
    }
}
