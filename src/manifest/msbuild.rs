//! Just enough MSBuild evaluation for best-effort property extraction

use crate::util::paths;
use regex::Regex;
use roxmltree::{Document, Node};
use std::sync::OnceLock;

/// Evaluates `Condition` attributes and `$(Macro)` references for one
/// configuration/platform pair
pub(crate) struct Evaluator {
    configuration: String,
    platform: String,
    macros: Vec<(String, String)>,
}

impl Evaluator {
    pub fn new(configuration: &str, platform: &str) -> Self {
        Self {
            configuration: configuration.to_string(),
            platform: platform.to_string(),
            macros: vec![
                ("Configuration".to_string(), configuration.to_string()),
                ("Platform".to_string(), platform.to_string()),
            ],
        }
    }

    pub fn with_macro(mut self, name: &str, value: impl Into<String>) -> Self {
        self.macros.push((name.to_string(), value.into()));
        self
    }

    /// Replaces known macros and drops unknown ones
    pub fn expand(&self, value: &str) -> String {
        static MACRO: OnceLock<Regex> = OnceLock::new();
        let re = MACRO.get_or_init(|| Regex::new(r"\$\(([^)]+)\)").expect("valid regex"));

        re.replace_all(value, |caps: &regex::Captures| {
            self.macros
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(&caps[1]))
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        })
        .into_owned()
    }

    /// Whether a single `Condition` string holds for this configuration
    pub fn condition_holds(&self, condition: &str) -> bool {
        static COMPARISON: OnceLock<Regex> = OnceLock::new();
        let re = COMPARISON.get_or_init(|| {
            Regex::new(r"'([^']*)'\s*(==|!=)\s*'([^']*)'").expect("valid regex")
        });

        let mut results = re.captures_iter(condition).filter_map(|caps| {
            let left = caps[1]
                .replace("$(Configuration)", &self.configuration)
                .replace("$(Platform)", &self.platform);
            if left.contains("$(") {
                // Some other property we do not track
                return None;
            }
            let equal = left.eq_ignore_ascii_case(caps[3].trim());
            Some(if &caps[2] == "==" { equal } else { !equal })
        });

        if condition.to_ascii_lowercase().contains(" or ") {
            let collected: Vec<bool> = results.collect();
            collected.is_empty() || collected.into_iter().any(|r| r)
        } else {
            results.all(|r| r)
        }
    }

    /// A node applies when its own condition and every ancestor's hold
    pub fn applies(&self, node: Node) -> bool {
        node.ancestors()
            .filter_map(|n| n.attribute("Condition"))
            .all(|c| self.condition_holds(c))
    }

    fn applicable<'a, 'input>(
        &'a self,
        doc: &'a Document<'input>,
        tag: &'a str,
    ) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
        doc.descendants()
            .filter(move |n| n.is_element() && n.has_tag_name(tag))
            .filter(move |n| self.applies(*n))
    }

    /// Last applicable value of a property (MSBuild is last-writer-wins)
    pub fn property(&self, doc: &Document, tag: &str) -> Option<String> {
        self.applicable(doc, tag)
            .filter_map(|n| n.text())
            .map(|t| self.expand(t.trim()))
            .filter(|t| !t.is_empty())
            .last()
    }

    /// `;`-separated list property, merged across applicable definitions
    pub fn list(&self, doc: &Document, tag: &str) -> Vec<String> {
        let mut values: Vec<String> = Vec::new();
        for node in self.applicable(doc, tag) {
            if let Some(text) = node.text() {
                for value in split_list(&self.expand(text)) {
                    if !values.contains(&value) {
                        values.push(value);
                    }
                }
            }
        }
        values
    }

    /// `Include` attributes of applicable item elements, with `/` separators
    pub fn items(&self, doc: &Document, tag: &str) -> Vec<String> {
        self.applicable(doc, tag)
            .filter_map(|n| n.attribute("Include"))
            .flat_map(|include| split_list(&self.expand(include)))
            .map(|i| paths::to_unix(&i))
            .collect()
    }
}

/// Splits an MSBuild list, skipping `%(Inherited)` references and blanks
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.starts_with("%("))
        .map(str::to_string)
        .collect()
}
