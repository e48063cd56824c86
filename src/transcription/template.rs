//! Command template resolution.
//!
//! A template is a plain string such as
//! `transcribe --in {{INPUT}} --out {{OUTPUT}} --instrument {{INSTRUMENT}}`.
//! Each placeholder is replaced textually wherever it appears, then the result
//! is split on whitespace into an argument vector.

use anyhow::{bail, Result};

pub const INPUT_PLACEHOLDER: &str = "{{INPUT}}";
pub const OUTPUT_PLACEHOLDER: &str = "{{OUTPUT}}";
pub const INSTRUMENT_PLACEHOLDER: &str = "{{INSTRUMENT}}";

/// A configured command line with placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    template: String,
}

impl CommandTemplate {
    /// Blank templates are rejected: there would be nothing to run.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if template.trim().is_empty() {
            bail!("command template is empty");
        }
        Ok(Self { template })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Substitute the placeholders and split into argv.
    ///
    /// Placeholders missing from the template are simply not used. The result
    /// may be empty if the template consisted only of placeholders that
    /// resolved to empty strings.
    pub fn resolve(&self, input: &str, output: &str, instrument: &str) -> Vec<String> {
        self.template
            .replace(INPUT_PLACEHOLDER, input)
            .replace(OUTPUT_PLACEHOLDER, output)
            .replace(INSTRUMENT_PLACEHOLDER, instrument)
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(template: &str, input: &str, output: &str, instrument: &str) -> Vec<String> {
        CommandTemplate::new(template)
            .unwrap()
            .resolve(input, output, instrument)
    }

    #[test]
    fn test_resolve_without_placeholders() {
        assert_eq!(resolve("app", "1", "2", ""), vec!["app"]);
    }

    #[test]
    fn test_resolve_is_order_independent() {
        assert_eq!(resolve("app {{INPUT}}", "1", "2", ""), vec!["app", "1"]);
        assert_eq!(resolve("app {{OUTPUT}} {{INPUT}}", "1", "2", ""), vec!["app", "2", "1"]);
        assert_eq!(
            resolve("app {{OUTPUT}} {{INPUT}}={{OUTPUT}}", "1", "2", ""),
            vec!["app", "2", "1=2"]
        );
    }

    #[test]
    fn test_resolve_appends_instrument() {
        assert_eq!(
            resolve("app {{OUTPUT}} {{INPUT}}={{OUTPUT}} {{INSTRUMENT}}", "1", "2", "flute"),
            vec!["app", "2", "1=2", "flute"]
        );
    }

    #[test]
    fn test_empty_instrument_disappears() {
        assert_eq!(
            resolve("app {{INPUT}} {{INSTRUMENT}}  {{OUTPUT}}", "in", "out", ""),
            vec!["app", "in", "out"]
        );
    }

    #[test]
    fn test_resolve_can_be_empty() {
        let template = CommandTemplate::new("{{INSTRUMENT}}").unwrap();
        assert!(template.resolve("1", "2", "").is_empty());
    }

    #[test]
    fn test_blank_template_rejected() {
        assert!(CommandTemplate::new("").is_err());
        assert!(CommandTemplate::new("   ").is_err());
    }
}
