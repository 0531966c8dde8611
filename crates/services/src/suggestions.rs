//! Per-site suggestion buttons.
//!
//! The panel shows a row of quick actions whose set depends on the page the
//! user is looking at. Rules pair a URL regex with a button list; the first
//! matching rule wins, and a catch-all rule at the end supplies the default
//! actions.

use regex::Regex;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SuggestionButton {
    pub key: String,
    pub title: String,
    pub description: String,
}

/// Rule as it appears in configuration, before the pattern is compiled.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSpec {
    pub url_pattern: String,
    pub buttons: Vec<SuggestionButton>,
}

struct SuggestionRule {
    pattern: Regex,
    buttons: Vec<SuggestionButton>,
}

pub struct SuggestionConfig {
    rules: Vec<SuggestionRule>,
}

impl SuggestionConfig {
    /// Compile rule specs, skipping any whose pattern does not parse.
    pub fn from_specs(specs: Vec<RuleSpec>) -> Self {
        let rules = specs
            .into_iter()
            .filter_map(|spec| match Regex::new(&spec.url_pattern) {
                Ok(pattern) => Some(SuggestionRule {
                    pattern,
                    buttons: spec.buttons,
                }),
                Err(e) => {
                    warn!(pattern = %spec.url_pattern, error = %e, "skipping suggestion rule");
                    None
                }
            })
            .collect();
        Self { rules }
    }

    /// Buttons for `url`, from the first rule whose pattern matches.
    pub fn buttons_for(&self, url: &str) -> &[SuggestionButton] {
        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(url))
            .map(|rule| rule.buttons.as_slice())
            .unwrap_or(&[])
    }
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        let button = |key: &str, title: &str, description: &str| SuggestionButton {
            key: key.to_string(),
            title: title.to_string(),
            description: description.to_string(),
        };
        Self::from_specs(vec![RuleSpec {
            url_pattern: ".*".to_string(),
            buttons: vec![
                button("summarize", "Summarize", "Summarize this page"),
                button("highlights", "Highlights", "Pull out the key points"),
                button("ask", "Ask", "Ask a question about this page"),
            ],
        }])
    }
}
