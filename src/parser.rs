use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

mod entities;

pub use entities::LogEntry;

/// Errors raised while reading log files
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to read log: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid log format: {0}")]
    InvalidLogFormat(String),
}

/// Parses a log file into a vector of LogEntry structs
pub fn parse_log_file(path: impl AsRef<Path>) -> Result<Vec<LogEntry>, ParseError> {
    let file = File::open(path)?;
    parse_log_reader(BufReader::new(file))
}

/// Parses log text from any buffered reader
///
/// A line containing the ` | ` separator starts a new entry; any other line
/// continues the previous one. Entries that do not parse are skipped.
pub fn parse_log_reader(reader: impl BufRead) -> Result<Vec<LogEntry>, ParseError> {
    let mut logs = Vec::new();
    let mut current: Option<(usize, String)> = None;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;

        if line.contains(" | ") {
            if let Some((line_number, log_text)) = current.take() {
                push_entry(&mut logs, line_number, &log_text);
            }
            current = Some((index + 1, line));
        } else if let Some((_, log_text)) = current.as_mut() {
            log_text.push('\n');
            log_text.push_str(&line);
        }
    }

    if let Some((line_number, log_text)) = current {
        push_entry(&mut logs, line_number, &log_text);
    }

    Ok(logs)
}

fn push_entry(logs: &mut Vec<LogEntry>, line_number: usize, log_text: &str) {
    match parse_log_entry(log_text) {
        Ok(mut entry) => {
            entry.source_line_number = line_number;
            logs.push(entry);
        }
        Err(err) => debug!(line = line_number, error = %err, "skipping unparseable log entry"),
    }
}

/// Parses a single log entry string into a LogEntry struct
pub fn parse_log_entry(log_text: &str) -> Result<LogEntry, ParseError> {
    let (component_part, rest) = log_text
        .split_once(" | ")
        .ok_or_else(|| ParseError::InvalidLogFormat("Missing log message section".to_string()))?;

    let (component, component_id) = extract_component_info(component_part);

    let (timestamp, level, message) = extract_log_parts(rest)
        .ok_or_else(|| ParseError::InvalidLogFormat("Invalid log format".to_string()))?;

    let timestamp = timestamp.parse::<DateTime<Utc>>().map_err(|err| {
        ParseError::InvalidLogFormat(format!("Invalid timestamp '{timestamp}': {err}"))
    })?;

    Ok(LogEntry {
        component: component.to_string(),
        component_id: component_id.to_string(),
        timestamp,
        level: level.to_string(),
        message: message.to_string(),
        raw_logline: log_text.to_string(),
        payload: extract_json(message),
        source_line_number: 1,
    })
}

/// Extracts component name and additional component info
fn extract_component_info(component_part: &str) -> (&str, &str) {
    if let Some((component, id_part)) = component_part.split_once(' ')
        && let Some(component_id) = id_part
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
        && !component_id.is_empty()
    {
        return (component, component_id);
    }
    (component_part, "")
}

/// Extracts timestamp, log level, and message from the rest of the log
fn extract_log_parts(rest: &str) -> Option<(&str, &str, &str)> {
    let timestamp_end = rest.find('[')?;
    let timestamp = rest[..timestamp_end].trim();

    let level_start = timestamp_end + 1;
    let level_end = rest[level_start..].find(']')? + level_start;
    let level = rest[level_start..level_end].trim();

    let after_level = &rest[level_end + 1..];
    let message = after_level.strip_prefix(' ').unwrap_or(after_level);

    Some((timestamp, level, message))
}

/// Finds the first JSON object or array embedded in a message
fn extract_json(input: &str) -> Option<Value> {
    input
        .char_indices()
        .filter(|&(_, c)| c == '{' || c == '[')
        .find_map(|(i, _)| extract_json_from_position(input, i))
}

/// Attempts to extract valid JSON starting from a specific position
///
/// Payloads are often printed as JavaScript object literals, so the text is
/// read with json5 and `undefined` is treated as `null`.
fn extract_json_from_position(input: &str, start_pos: usize) -> Option<Value> {
    let first_char = input[start_pos..].chars().next()?;
    if first_char != '{' && first_char != '[' {
        return None;
    }

    let mut brace_count = 0i32;
    let mut bracket_count = 0i32;
    let mut in_string: Option<char> = None;
    let mut escape_next = false;

    for (i, c) in input[start_pos..].char_indices() {
        if let Some(quote) = in_string {
            if escape_next {
                escape_next = false;
            } else if c == '\\' {
                escape_next = true;
            } else if c == quote {
                in_string = None;
            }
            continue;
        }

        match c {
            '"' | '\'' => in_string = Some(c),
            '{' => brace_count += 1,
            '[' => bracket_count += 1,
            '}' => brace_count -= 1,
            ']' => bracket_count -= 1,
            _ => continue,
        }

        if brace_count == 0 && bracket_count == 0 {
            let json_str = input[start_pos..=start_pos + i].replace("undefined", "null");
            return json5::from_str::<Value>(&json_str).ok();
        }
        if brace_count < 0 || bracket_count < 0 {
            return None;
        }
    }

    None
}
