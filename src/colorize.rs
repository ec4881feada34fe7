//! Colorizing rules
//!
//! A colorizing rule is a named filter with a foreground and background
//! color. When several enabled rules match an entry, the one with the lowest
//! priority value wins.

use colored::{Color, ColoredString, Colorize};
use std::str::FromStr;

use crate::filter::{Evaluator, FieldResolver, FilterRegistry, FilterRule};
use crate::parser::LogEntry;

#[derive(Debug, Clone, PartialEq)]
pub struct ColorizingRule {
    rule: FilterRule,
    pub foreground: Option<Color>,
    pub background: Option<Color>,
    pub priority: i32,
    pub enabled: bool,
}

impl ColorizingRule {
    /// An enabled rule with no colors and priority 0
    pub fn new(rule: FilterRule) -> Self {
        Self {
            rule,
            foreground: None,
            background: None,
            priority: 0,
            enabled: true,
        }
    }

    pub fn with_colors(mut self, foreground: Option<Color>, background: Option<Color>) -> Self {
        self.foreground = foreground;
        self.background = background;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn name(&self) -> &str {
        self.rule.name()
    }

    pub fn rule(&self) -> &FilterRule {
        &self.rule
    }

    pub fn paint(&self, text: ColoredString) -> ColoredString {
        let text = match self.foreground {
            Some(color) => text.color(color),
            None => text,
        };
        match self.background {
            Some(color) => text.on_color(color),
            None => text,
        }
    }
}

/// Parse a color name such as `red` or `bright blue`, or a `#rrggbb` value
pub fn parse_color(name: &str) -> Option<Color> {
    Color::from_str(name.trim()).ok()
}

/// Short label for a color in listings
pub fn color_label(color: Option<Color>) -> String {
    color.map_or_else(|| "-".to_string(), |color| format!("{color:?}"))
}

/// Ordered set of colorizing rules
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorRules {
    rules: Vec<ColorizingRule>,
}

impl ColorRules {
    pub fn new(rules: Vec<ColorizingRule>) -> Self {
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn rules(&self) -> &[ColorizingRule] {
        &self.rules
    }

    pub fn get(&self, index: usize) -> Option<&ColorizingRule> {
        self.rules.get(index)
    }

    /// Index of the winning rule for `entry`
    ///
    /// Disabled rules are skipped. On equal priority the rule declared first
    /// wins. A rule whose evaluation fails does not match.
    pub fn pick<F, L>(&self, entry: &LogEntry, evaluator: &Evaluator<'_, F, L>) -> Option<usize>
    where
        F: FieldResolver<LogEntry> + ?Sized,
        L: FilterRegistry + ?Sized,
    {
        self.rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| rule.enabled && evaluator.matches(rule.rule.root(), entry))
            .min_by_key(|(_, rule)| rule.priority)
            .map(|(index, _)| index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::LogFields;
    use crate::filter::{FilterLibrary, FilterParser};
    use crate::parser::parse_log_entry;

    fn rule(name: &str, filter: &str, priority: i32) -> ColorizingRule {
        let fields = LogFields::with_case_insensitive(["level"]);
        let root = FilterParser::new(&fields).parse(filter).unwrap();
        ColorizingRule::new(FilterRule::new(name, root)).with_priority(priority)
    }

    #[test]
    fn test_parse_color_names() {
        assert_eq!(parse_color("red"), Some(Color::Red));
        assert_eq!(parse_color(" Bright Blue "), Some(Color::BrightBlue));
        assert_eq!(
            parse_color("#ff8000"),
            Some(Color::TrueColor { r: 255, g: 128, b: 0 })
        );
        assert_eq!(parse_color("not-a-color"), None);
        assert_eq!(color_label(None), "-");
        assert_eq!(color_label(Some(Color::Yellow)), "Yellow");
    }

    #[test]
    fn test_lowest_priority_enabled_match_wins() {
        let fields = LogFields::with_case_insensitive(["level"]);
        let library = FilterLibrary::new();
        let evaluator = Evaluator::new(&fields, &library);
        let error = parse_log_entry("socket | 2025-04-03T21:35:06.200Z [ERROR] refused").unwrap();
        let info = parse_log_entry("core | 2025-04-03T21:35:06.100Z [INFO ] starting").unwrap();

        let mut disabled = rule("first", r#""refused""#, -5);
        disabled.enabled = false;
        let rules = ColorRules::new(vec![
            disabled,
            rule("errors", r#"level == "error""#, 2),
            rule("socket", r#"component == "socket""#, 1),
            rule("also_socket", r#"component == "socket""#, 1),
        ]);

        assert_eq!(rules.pick(&error, &evaluator), Some(2));
        assert_eq!(rules.get(2).map(ColorizingRule::name), Some("socket"));
        assert_eq!(rules.pick(&info, &evaluator), None);
        assert_eq!(ColorRules::default().pick(&error, &evaluator), None);
    }

    #[test]
    fn test_paint_applies_both_colors() {
        let painted = rule("r", r#""x""#, 0)
            .with_colors(Some(Color::Red), Some(Color::Blue))
            .paint("line".normal());
        assert_eq!(painted.fgcolor, Some(Color::Red));
        assert_eq!(painted.bgcolor, Some(Color::Blue));

        let plain = rule("r", r#""x""#, 0).paint("line".normal());
        assert_eq!(plain.fgcolor, None);
        assert_eq!(plain.bgcolor, None);
    }
}
