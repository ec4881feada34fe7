pub mod cli;
pub mod colorize;
pub mod config;
pub mod fields;
pub mod filter;
pub mod parser;
pub mod search;

use anyhow::{Context, Result, bail};
use colored::Colorize;
use comfy_table::{Cell, ContentArrangement, Table, presets};
use serde_json::json;
use std::fmt::Write;
use std::path::Path;
use tracing::{info, warn};

use crate::colorize::{ColorRules, color_label};
use crate::filter::{
    Dependencies, Evaluator, FilterLibrary, FilterParser, Node, analyze_dependencies,
};
use crate::search::{
    FilterRun, format_search_count_text, format_search_json, format_search_text,
    search_count_json, search_json,
};
pub use cli::{Cli, ColorMode, Commands, OutputFormat, cli_parse};
pub use config::{ConfigError, FilterConfig, load_config};
pub use fields::LogFields;
pub use parser::{LogEntry, ParseError, parse_log_entry, parse_log_file};

fn write_output_file(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write output file '{}'", path.display()))
}

/// Print `text` and mirror it to the output file, if any
fn emit(text: &str, output: Option<&Path>) -> Result<()> {
    print!("{text}");
    if let Some(path) = output {
        write_output_file(path, text)?;
    }
    Ok(())
}

fn create_styled_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| Cell::new(h)));
    table
}

fn parse_expression(
    filter: &str,
    fields: &LogFields,
    library: &FilterLibrary,
    max_depth: usize,
) -> Result<Node> {
    FilterParser::new(fields)
        .with_registry(library)
        .with_max_depth(max_depth)
        .parse(filter)
        .with_context(|| format!("Invalid filter expression: {filter}"))
}

fn join_or_dash<'a>(items: impl IntoIterator<Item = &'a String>) -> String {
    let joined = items
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() { "-".to_string() } else { joined }
}

fn format_check_text(node: &Node, deps: &Dependencies) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {node}", "Canonical:".bold());
    let _ = writeln!(out, "{} {}", "Fields:".bold(), join_or_dash(&deps.fields));
    let _ = writeln!(out, "{} {}", "Aliases:".bold(), join_or_dash(&deps.aliases));
    if deps.errors.is_empty() {
        let _ = writeln!(out, "{} {}", "Status:".bold(), "ok".green());
    } else {
        let _ = writeln!(out, "{}", "Errors:".red().bold());
        for error in &deps.errors {
            let _ = writeln!(out, "  - {error}");
        }
    }
    out
}

fn format_check_json(node: &Node, deps: &Dependencies) -> String {
    let value = json!({
        "check": {
            "canonical": node.to_string(),
            "fields": deps.fields,
            "aliases": deps.aliases,
            "errors": deps.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
        }
    });
    serde_json::to_string_pretty(&value)
        .unwrap_or_else(|_| "{\"check\":{\"error\":\"failed to serialize check output\"}}".into())
}

fn format_library_text(config: &FilterConfig, library: &FilterLibrary, colors: &ColorRules) -> String {
    if library.is_empty() && colors.is_empty() {
        return format!("No saved filters in profile '{}'.\n", config.profile_name);
    }

    let mut table = create_styled_table(&["Name", "Filter", "Depends on"]);
    for rule in library.rules() {
        let deps = analyze_dependencies(rule.root(), library, false);
        table.add_row(vec![
            Cell::new(rule.name()),
            Cell::new(rule.filter_string()),
            Cell::new(join_or_dash(&deps.aliases)),
        ]);
    }
    let mut out = format!(
        "Saved filters ({}, {} total)\n{table}\n",
        config.profile_name,
        library.len()
    );

    if !colors.is_empty() {
        let mut table =
            create_styled_table(&["Color rule", "Filter", "Foreground", "Background", "Priority", "Enabled"]);
        for rule in colors.rules() {
            table.add_row(vec![
                Cell::new(rule.name()),
                Cell::new(rule.rule().filter_string()),
                Cell::new(color_label(rule.foreground)),
                Cell::new(color_label(rule.background)),
                Cell::new(rule.priority),
                Cell::new(if rule.enabled { "yes" } else { "no" }),
            ]);
        }
        let _ = writeln!(out, "Color rules ({} total)\n{table}", colors.len());
    }
    out
}

fn format_library_json(config: &FilterConfig, library: &FilterLibrary, colors: &ColorRules) -> String {
    let rules = library.rules();
    let color_rules: Vec<_> = colors
        .rules()
        .iter()
        .map(|rule| {
            json!({
                "name": rule.name(),
                "filter": rule.rule().filter_string(),
                "foreground": rule.foreground.map(|color| format!("{color:?}")),
                "background": rule.background.map(|color| format!("{color:?}")),
                "priority": rule.priority,
                "enabled": rule.enabled,
            })
        })
        .collect();
    let value = json!({
        "library": {
            "profile": config.profile_name,
            "filters": rules.iter().map(|rule| rule.as_ref()).collect::<Vec<_>>(),
            "color_rules": color_rules,
        }
    });
    serde_json::to_string_pretty(&value)
        .unwrap_or_else(|_| "{\"library\":{\"error\":\"failed to serialize library\"}}".into())
}

pub fn run(cli: &Cli) -> Result<()> {
    match cli.color {
        ColorMode::Always => colored::control::set_override(true),
        ColorMode::Never => colored::control::set_override(false),
        ColorMode::Auto => {}
    }

    let config = load_config(cli.config.as_deref()).context("Failed to load config")?;
    let fields = config.log_fields();
    let library = config
        .build_library(&fields)
        .context("Failed to load saved filters from config")?;
    let colors = config
        .build_color_rules(&fields, &library)
        .context("Failed to load color rules from config")?;
    info!(
        profile = %config.profile_name,
        saved_filters = library.len(),
        color_rules = colors.len(),
        max_depth = config.evaluation.max_depth,
        "configuration loaded"
    );
    let output = cli.output.as_deref();

    match &cli.command {
        Commands::Search {
            files,
            filter,
            context,
            count,
        } => {
            let node = parse_expression(filter, &fields, &library, config.evaluation.max_depth)?;
            for error in analyze_dependencies(&node, &library, true).errors {
                warn!(%error, "filter will not match as written");
            }
            info!(filter = %node, "searching");

            let evaluator =
                Evaluator::new(&fields, &library).with_max_depth(config.evaluation.max_depth);
            let mut text = String::new();
            let mut values = Vec::with_capacity(files.len());

            for file in files {
                let logs = parse_log_file(file)
                    .with_context(|| format!("Failed to parse log file '{}'", file.display()))?;
                let mut run = FilterRun::execute(&logs, &node, &evaluator);
                if !*count {
                    run.apply_colors(&logs, &colors, &evaluator);
                }

                match (cli.format, *count) {
                    (OutputFormat::Text, true) => {
                        text.push_str(&format_search_count_text(file, &run, files.len() > 1))
                    }
                    (OutputFormat::Text, false) => {
                        text.push_str(&format_search_text(file, &logs, &run, *context, &colors))
                    }
                    (OutputFormat::Json, true) => values.push(search_count_json(file, &run)),
                    (OutputFormat::Json, false) => {
                        values.push(search_json(file, &logs, &run, *context, &colors))
                    }
                }
            }

            if cli.format == OutputFormat::Json {
                text = format_search_json(values);
                text.push('\n');
            }
            emit(&text, output)
        }
        Commands::Check { filter } => {
            let node = parse_expression(filter, &fields, &library, config.evaluation.max_depth)?;
            let deps = analyze_dependencies(&node, &library, true);
            let text = match cli.format {
                OutputFormat::Text => format_check_text(&node, &deps),
                OutputFormat::Json => format_check_json(&node, &deps) + "\n",
            };
            emit(&text, output)?;
            if !deps.errors.is_empty() {
                bail!("Filter references {} unresolved or cyclic alias(es)", deps.errors.len());
            }
            Ok(())
        }
        Commands::Library => {
            let text = match cli.format {
                OutputFormat::Text => format_library_text(&config, &library, &colors),
                OutputFormat::Json => format_library_json(&config, &library, &colors) + "\n",
            };
            emit(&text, output)
        }
    }
}
