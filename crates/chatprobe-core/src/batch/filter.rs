use regex::{Regex, RegexBuilder};
use tracing::trace;

use super::BatchDefinition;

#[derive(Debug, Clone)]
enum Rule {
    Name(String),
    Pattern(Regex),
}

/// Selects batches by name, or by a `*` pattern over their file path.
#[derive(Debug, Clone, Default)]
pub struct BatchFilter {
    rules: Vec<Rule>,
}

impl BatchFilter {
    /// A filter containing `*` is a pattern: `*` matches any run of
    /// characters, the rest is literal, and it matches case-insensitively
    /// anywhere in the batch's file path. Any other filter is an exact name.
    pub fn new<I, S>(filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = filters
            .into_iter()
            .filter_map(|filter| {
                let filter = filter.as_ref();
                if !filter.contains('*') {
                    return Some(Rule::Name(filter.to_string()));
                }
                let source = filter
                    .split('*')
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(".*");
                // escaped literals joined by `.*` always compile
                RegexBuilder::new(&source)
                    .case_insensitive(true)
                    .build()
                    .ok()
                    .map(Rule::Pattern)
            })
            .collect();
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn matches(&self, batch: &BatchDefinition) -> bool {
        if self.rules.is_empty() {
            return true;
        }

        let path = batch.file_path.to_string_lossy();
        self.rules.iter().any(|rule| {
            let matched = match rule {
                Rule::Name(name) => *name == batch.name,
                Rule::Pattern(pattern) => pattern.is_match(&path),
            };
            if matched {
                trace!(target: "chatprobe::batch", batch = %batch.name, path = %path, "Filter matched");
            }
            matched
        })
    }
}
