//! Ingestion of delimited two-column timing-gate exports.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::{Sample, SprintError};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldSeparator {
    Tab,
    Semicolon,
    Comma,
    /// Any run of spaces or tabs.
    Whitespace,
}

impl Default for FieldSeparator {
    fn default() -> Self {
        FieldSeparator::Tab
    }
}

impl FieldSeparator {
    fn byte(&self) -> Option<u8> {
        match self {
            FieldSeparator::Tab => Some(b'\t'),
            FieldSeparator::Semicolon => Some(b';'),
            FieldSeparator::Comma => Some(b','),
            FieldSeparator::Whitespace => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecimalSeparator {
    Point,
    Comma,
}

impl Default for DecimalSeparator {
    fn default() -> Self {
        DecimalSeparator::Comma
    }
}

/// Layout of the sensor export. Defaults match the timing software: tab separated
/// fields with a decimal comma.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InputFormat {
    pub field_separator: FieldSeparator,
    pub decimal_separator: DecimalSeparator,
}

impl InputFormat {
    pub fn validate(&self) -> Result<(), SprintError> {
        if self.field_separator == FieldSeparator::Comma
            && self.decimal_separator == DecimalSeparator::Comma
        {
            return Err(SprintError::InvalidParameter(
                "comma cannot be both field and decimal separator".into(),
            ));
        }
        Ok(())
    }

    fn parse_number(&self, field: &str) -> Option<f64> {
        let trimmed = field.trim();
        if trimmed.is_empty() {
            return None;
        }
        let value = match self.decimal_separator {
            DecimalSeparator::Point => trimmed.parse::<f64>().ok()?,
            DecimalSeparator::Comma => trimmed.replace(',', ".").parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

/// Normalized samples plus ingestion counters.
#[derive(Clone, Debug)]
pub struct LoadedSamples {
    /// Sorted by time; equal timestamps keep their file order.
    pub samples: Vec<Sample>,
    /// Non-blank rows seen, header included.
    pub rows_read: usize,
    pub rows_dropped: usize,
}

impl LoadedSamples {
    /// Normalize samples that did not come from text.
    pub fn from_samples(samples: Vec<Sample>) -> Result<Self, SprintError> {
        let rows_read = samples.len();
        let valid: Vec<Sample> = samples
            .into_iter()
            .filter(|s| s.time_s.is_finite() && s.distance_m.is_finite())
            .collect();
        Self::finish(valid, rows_read)
    }

    fn finish(mut samples: Vec<Sample>, rows_read: usize) -> Result<Self, SprintError> {
        if samples.len() < 2 {
            return Err(SprintError::MalformedInput(format!(
                "{} valid row(s) out of {}; at least 2 are required",
                samples.len(),
                rows_read
            )));
        }
        // `sort_by_key` is stable, so duplicate timestamps stay in file order.
        samples.sort_by_key(|s| OrderedFloat(s.time_s));
        let rows_dropped = rows_read - samples.len();
        Ok(Self {
            samples,
            rows_read,
            rows_dropped,
        })
    }

    pub fn time_span_s(&self) -> f64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last.time_s - first.time_s,
            _ => 0.0,
        }
    }

    pub fn max_distance_m(&self) -> f64 {
        self.samples
            .iter()
            .map(|s| s.distance_m)
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Parse delimited text into normalized samples.
///
/// The first two fields of each row are time and distance; further fields are ignored.
/// Rows whose first two fields are not both finite numbers (headers included) are
/// dropped. Blank rows are skipped without being counted.
pub fn parse_samples(input: &str, format: &InputFormat) -> Result<LoadedSamples, SprintError> {
    format.validate()?;
    let rows = match format.field_separator.byte() {
        Some(delimiter) => split_delimited(input, delimiter)?,
        None => split_whitespace(input),
    };

    let rows_read = rows.len();
    let samples: Vec<Sample> = rows
        .iter()
        .filter_map(|fields| {
            let time = format.parse_number(fields.first()?)?;
            let distance = format.parse_number(fields.get(1)?)?;
            Some(Sample::new(time, distance))
        })
        .collect();

    LoadedSamples::finish(samples, rows_read)
}

fn split_delimited(input: &str, delimiter: u8) -> Result<Vec<Vec<String>>, SprintError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(input.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| SprintError::MalformedInput(e.to_string()))?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

fn split_whitespace(input: &str) -> Vec<Vec<String>> {
    input
        .lines()
        .map(|line| line.split_whitespace().map(str::to_string).collect::<Vec<_>>())
        .filter(|fields| !fields.is_empty())
        .collect()
}
