use crate::colorize::ColorRules;
use crate::filter::{EvalError, Evaluator, FieldResolver, FilterRegistry, Node};
use crate::parser::LogEntry;
use chrono::SecondsFormat;
use colored::Colorize;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Write;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone)]
struct DisplayRow {
    idx: usize,
    is_match: bool,
    new_chunk: bool,
}

/// Errors recorded while evaluating the filter against one entry
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// Index of the entry in the searched slice
    pub index: usize,
    pub line: usize,
    pub errors: Vec<EvalError>,
}

/// Result of applying one filter to a list of entries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterRun {
    pub matches: Vec<usize>,
    pub diagnostics: Vec<Diagnostic>,
    /// Matched entry index to the index of its winning color rule
    pub colors: BTreeMap<usize, usize>,
}

impl FilterRun {
    /// Evaluate `node` against every entry in order
    pub fn execute<F, L>(logs: &[LogEntry], node: &Node, evaluator: &Evaluator<'_, F, L>) -> Self
    where
        F: FieldResolver<LogEntry> + ?Sized,
        L: FilterRegistry + ?Sized,
    {
        let mut run = FilterRun::default();
        for (idx, entry) in logs.iter().enumerate() {
            let (matched, ctx) = evaluator.evaluate(node, entry);
            if matched {
                run.matches.push(idx);
            }
            if !ctx.is_success() {
                run.diagnostics.push(Diagnostic {
                    index: idx,
                    line: entry.source_line_number,
                    errors: ctx.errors().to_vec(),
                });
            }
        }
        debug!(
            entries = logs.len(),
            matches = run.matches.len(),
            diagnostics = run.diagnostics.len(),
            "filter run finished"
        );
        run
    }

    /// Pick a color rule for every matched entry
    pub fn apply_colors<F, L>(
        &mut self,
        logs: &[LogEntry],
        rules: &ColorRules,
        evaluator: &Evaluator<'_, F, L>,
    ) where
        F: FieldResolver<LogEntry> + ?Sized,
        L: FilterRegistry + ?Sized,
    {
        if rules.is_empty() {
            return;
        }
        for &idx in &self.matches {
            if let Some(rule) = rules.pick(&logs[idx], evaluator) {
                self.colors.insert(idx, rule);
            }
        }
        debug!(colored = self.colors.len(), "color rules applied");
    }

    /// Distinct error messages with the source lines that produced them
    pub fn grouped_diagnostics(&self) -> BTreeMap<String, Vec<usize>> {
        let mut grouped: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for diagnostic in &self.diagnostics {
            for error in &diagnostic.errors {
                grouped
                    .entry(error.to_string())
                    .or_default()
                    .push(diagnostic.line);
            }
        }
        grouped
    }
}

pub fn format_search_text(
    file: &Path,
    logs: &[LogEntry],
    run: &FilterRun,
    context: usize,
    colors: &ColorRules,
) -> String {
    let mut out = String::new();
    let match_count = run.matches.len();
    let _ = writeln!(
        out,
        "SEARCH {} matched {} entr{}",
        file.display(),
        match_count,
        if match_count == 1 { "y" } else { "ies" }
    );

    if match_count == 0 {
        let _ = writeln!(out, "No matching log entries found.");
    } else {
        if context > 0 {
            let _ = writeln!(out, "Context: {context} entries");
        }
        out.push('\n');

        for row in build_display_rows(logs, &run.matches, context) {
            if row.new_chunk {
                let _ = writeln!(out, "--");
            }

            let entry = &logs[row.idx];
            let marker = if row.is_match { '>' } else { ' ' };
            let ts = entry.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
            let component_label = if entry.component_id.is_empty() {
                entry.component.clone()
            } else {
                format!("{} ({})", entry.component, entry.component_id)
            };
            let message = entry.message.replace('\n', "\\n");
            let line = format!(
                "{marker}{:>6}: {} [{}] {} | {}",
                entry.source_line_number, ts, entry.level, component_label, message
            );

            if row.is_match {
                let styled = match run.colors.get(&row.idx).and_then(|&rule| colors.get(rule)) {
                    Some(rule) => rule.paint(line.bold()),
                    None => line.bold(),
                };
                let _ = writeln!(out, "{styled}");
            } else {
                let _ = writeln!(out, "{}", line.dimmed());
            }
        }
    }

    write_diagnostics_text(&mut out, run);
    out
}

fn write_diagnostics_text(out: &mut String, run: &FilterRun) {
    if run.diagnostics.is_empty() {
        return;
    }

    let _ = writeln!(
        out,
        "\n{} {} entr{} reported evaluation errors",
        "Diagnostics:".yellow().bold(),
        run.diagnostics.len(),
        if run.diagnostics.len() == 1 { "y" } else { "ies" }
    );
    for (message, lines) in run.grouped_diagnostics() {
        let _ = writeln!(
            out,
            "  {:>4}x {} (first at line {})",
            lines.len(),
            message,
            lines.first().copied().unwrap_or_default()
        );
    }
}

pub fn search_json(
    file: &Path,
    logs: &[LogEntry],
    run: &FilterRun,
    context: usize,
    colors: &ColorRules,
) -> Value {
    let rows = build_display_rows(logs, &run.matches, context);
    let entries: Vec<_> = rows
        .iter()
        .map(|row| {
            let entry = &logs[row.idx];
            let color_rule = run
                .colors
                .get(&row.idx)
                .and_then(|&rule| colors.get(rule))
                .map(|rule| rule.name());
            json!({
                "is_match": row.is_match,
                "color_rule": color_rule,
                "source_line_number": entry.source_line_number,
                "timestamp": entry.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                "component": entry.component,
                "component_id": entry.component_id,
                "level": entry.level,
                "message": entry.message,
                "raw_logline": entry.raw_logline,
                "payload": entry.payload(),
            })
        })
        .collect();

    let diagnostics: Vec<_> = run
        .diagnostics
        .iter()
        .map(|diagnostic| {
            json!({
                "index": diagnostic.index,
                "source_line_number": diagnostic.line,
                "errors": diagnostic
                    .errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>(),
            })
        })
        .collect();

    json!({
        "file": file.display().to_string(),
        "entries_total": logs.len(),
        "matches": run.matches.len(),
        "context": context,
        "entries": entries,
        "diagnostics": diagnostics,
    })
}

pub fn format_search_json(searches: Vec<Value>) -> String {
    serde_json::to_string_pretty(&json!({ "search": searches }))
        .unwrap_or_else(|_| "{\"search\":{\"error\":\"failed to serialize search output\"}}".into())
}

pub fn format_search_count_text(file: &Path, run: &FilterRun, show_file: bool) -> String {
    if show_file {
        format!("{}: {}\n", file.display(), run.matches.len())
    } else {
        format!("{}\n", run.matches.len())
    }
}

pub fn search_count_json(file: &Path, run: &FilterRun) -> Value {
    json!({
        "file": file.display().to_string(),
        "matches": run.matches.len(),
        "diagnostics": run.diagnostics.len(),
    })
}

fn build_display_rows(
    logs: &[LogEntry],
    match_indices: &[usize],
    context: usize,
) -> Vec<DisplayRow> {
    if logs.is_empty() || match_indices.is_empty() {
        return Vec::new();
    }

    let match_set: HashSet<usize> = match_indices.iter().copied().collect();
    let mut included = BTreeSet::new();

    for &idx in match_indices {
        let start = idx.saturating_sub(context);
        let end = idx
            .saturating_add(context)
            .min(logs.len().saturating_sub(1));
        for i in start..=end {
            included.insert(i);
        }
    }

    let mut rows = Vec::with_capacity(included.len());
    let mut prev_idx = None;
    for idx in included {
        let new_chunk = prev_idx.is_some_and(|prev| idx > prev + 1);
        rows.push(DisplayRow {
            idx,
            is_match: match_set.contains(&idx),
            new_chunk,
        });
        prev_idx = Some(idx);
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colorize::ColorizingRule;
    use crate::fields::LogFields;
    use crate::filter::{FilterLibrary, FilterParser, FilterRule};
    use crate::parser::parse_log_entry;
    use colored::Color;

    fn logs() -> Vec<LogEntry> {
        [
            "core | 2025-04-03T21:35:06.100Z [INFO ] starting",
            "socket | 2025-04-03T21:35:06.200Z [ERROR] connection refused {code: 111}",
            "core | 2025-04-03T21:35:06.300Z [INFO ] idle",
            "core | 2025-04-03T21:35:06.400Z [INFO ] idle",
            "socket | 2025-04-03T21:35:06.500Z [WARN ] retry {code: 'x'}",
        ]
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let mut entry = parse_log_entry(line).unwrap();
            entry.source_line_number = i + 1;
            entry
        })
        .collect()
    }

    fn run(filter: &str) -> FilterRun {
        let fields = LogFields::with_case_insensitive(["level"]);
        let library = FilterLibrary::new();
        let node = FilterParser::new(&fields).parse(filter).unwrap();
        FilterRun::execute(&logs(), &node, &Evaluator::new(&fields, &library))
    }

    #[test]
    fn test_execute_collects_matches() {
        let result = run(r#"component == "socket""#);
        assert_eq!(result.matches, vec![1, 4]);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn test_execute_records_diagnostics_per_entry() {
        let result = run("payload.code > 100");
        assert_eq!(result.matches, vec![1]);
        // entries without a payload lack the field; the text code mismatches
        assert_eq!(result.diagnostics.len(), 4);
        assert_eq!(result.diagnostics[0].line, 1);
        let grouped = result.grouped_diagnostics();
        assert_eq!(
            grouped.get("Field 'payload.code' is not present on the record"),
            Some(&vec![1, 3, 4])
        );
    }

    #[test]
    fn test_display_rows_with_context() {
        let rows = build_display_rows(&logs(), &[1], 1);
        let indices: Vec<_> = rows.iter().map(|row| row.idx).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(rows[1].is_match);

        let split = build_display_rows(&logs(), &[0, 4], 0);
        assert!(split[1].new_chunk);
    }

    #[test]
    fn test_count_output() {
        let result = run(r#"level == "info""#);
        assert_eq!(format_search_count_text(Path::new("a.log"), &result, false), "3\n");
        assert_eq!(
            format_search_count_text(Path::new("a.log"), &result, true),
            "a.log: 3\n"
        );
    }

    #[test]
    fn test_json_output_shape() {
        let result = run(r#""refused""#);
        let value = search_json(Path::new("a.log"), &logs(), &result, 0, &ColorRules::default());
        assert_eq!(value["matches"], 1);
        assert_eq!(value["entries"][0]["source_line_number"], 2);
        assert_eq!(value["entries"][0]["payload"]["code"], 111);
        assert!(value["entries"][0]["color_rule"].is_null());
    }

    #[test]
    fn test_color_rules_paint_matched_rows_only() {
        let fields = LogFields::with_case_insensitive(["level"]);
        let library = FilterLibrary::new();
        let evaluator = Evaluator::new(&fields, &library);
        let color_rule = |name: &str, filter: &str, color: Color| {
            let root = FilterParser::new(&fields).parse(filter).unwrap();
            ColorizingRule::new(FilterRule::new(name, root)).with_colors(Some(color), None)
        };
        let rules = ColorRules::new(vec![
            color_rule("warnings", r#"level == "warn""#, Color::Yellow),
            color_rule("sockets", r#"component == "socket""#, Color::Red),
            color_rule("core", r#"component == "core""#, Color::Blue).with_priority(5),
        ]);

        let logs = logs();
        let mut result = run(r#"component == "socket" OR line == 3"#);
        result.apply_colors(&logs, &rules, &evaluator);
        // both rules match line 5; the first declared wins on equal priority
        assert_eq!(result.colors, BTreeMap::from([(1, 1), (2, 2), (4, 0)]));

        let value = search_json(Path::new("a.log"), &logs, &result, 1, &rules);
        let names: Vec<_> = value["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|entry| entry["color_rule"].clone())
            .collect();
        // context rows stay uncolored even where a rule would match
        assert_eq!(
            names,
            vec![
                Value::Null,
                json!("sockets"),
                json!("core"),
                Value::Null,
                json!("warnings")
            ]
        );

        let text = format_search_text(Path::new("a.log"), &logs, &result, 0, &rules);
        assert!(text.contains(">     2:"), "got:\n{text}");
    }
}
