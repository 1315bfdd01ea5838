//! Directive syntax parsing.
//!
//! Extracts `<name:tok1:tok2>` directives from prompt text.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::{Captures, Regex};

use crate::ParsedArguments;

/// Matches `<name:tokens>` up to the first closing bracket.
static DIRECTIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(\w+):([^>]+)>").unwrap());

/// Directive occurrences grouped by name.
///
/// Names keep the order in which they first appeared; occurrences of the same
/// name keep their scan order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(transparent))]
pub struct Directives {
    entries: IndexMap<String, Vec<ParsedArguments>>,
}

impl Directives {
    /// Create an empty directive set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an occurrence of `name`.
    pub fn push(&mut self, name: impl Into<String>, args: ParsedArguments) {
        self.entries.entry(name.into()).or_default().push(args);
    }

    /// Occurrences of `name`, if any were found.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[ParsedArguments]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// Directive names in first-appearance order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterate over `(name, occurrences)` in first-appearance order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ParsedArguments])> {
        self.entries
            .iter()
            .map(|(name, args)| (name.as_str(), args.as_slice()))
    }

    /// Number of distinct directive names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no directive was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>> FromIterator<(N, ParsedArguments)> for Directives {
    fn from_iter<T: IntoIterator<Item = (N, ParsedArguments)>>(iter: T) -> Self {
        let mut directives = Self::new();
        for (name, args) in iter {
            directives.push(name, args);
        }
        directives
    }
}

/// Extract directives from a prompt.
///
/// Returns the prompt with every directive span removed (surrounding text is
/// left untouched) and the directives found, in scan order. Text with an
/// unclosed `<` is kept as a literal.
///
/// # Example
///
/// ```
/// use xnet_directive::parse;
///
/// let (prompt, directives) = parse("<lora:a:1> x <hypernet:b> <lora:c>");
/// assert_eq!(prompt, " x  ");
/// assert_eq!(directives.get("lora").map(<[_]>::len), Some(2));
/// assert_eq!(directives.names().collect::<Vec<_>>(), ["lora", "hypernet"]);
/// ```
#[must_use]
pub fn parse(prompt: &str) -> (String, Directives) {
    let mut directives = Directives::new();

    let cleaned = DIRECTIVE_RE.replace_all(prompt, |caps: &Captures<'_>| {
        directives.push(&caps[1], ParsedArguments::new(caps[2].split(':')));
        ""
    });

    (cleaned.into_owned(), directives)
}

/// Extract directives from every prompt of a batch.
///
/// Every prompt is cleaned, but only the directives of the **first** prompt
/// are returned: all prompts of one batch are expected to carry the same
/// directives. An empty batch yields no prompts and no directives.
///
/// # Example
///
/// ```
/// use xnet_directive::parse_batch;
///
/// let (prompts, directives) = parse_batch(["<a:1> x", "<a:2> y"]);
/// assert_eq!(prompts, [" x", " y"]);
/// assert_eq!(directives.get("a").unwrap()[0].items(), ["1"]);
/// ```
#[must_use]
pub fn parse_batch<I, S>(prompts: I) -> (Vec<String>, Directives)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut cleaned = Vec::new();
    let mut first = None;

    for prompt in prompts {
        let (prompt, directives) = parse(prompt.as_ref());
        if first.is_none() {
            first = Some(directives);
        }
        cleaned.push(prompt);
    }

    (cleaned, first.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_directive() {
        let (prompt, directives) = parse("a <lora:foo:0.5> b");

        assert_eq!(prompt, "a  b");
        let expected: Directives = [("lora", ParsedArguments::new(["foo", "0.5"]))]
            .into_iter()
            .collect();
        assert_eq!(directives, expected);
    }

    #[test]
    fn test_no_directives() {
        let (prompt, directives) = parse("plain prompt, no effects");
        assert_eq!(prompt, "plain prompt, no effects");
        assert!(directives.is_empty());
    }

    #[test]
    fn test_repeated_name_accumulates_in_order() {
        let (_, directives) = parse("<hypernet:agm:1.1> <other:x:1> <hypernet:ray>");

        let hypernet = directives.get("hypernet").unwrap();
        assert_eq!(hypernet.len(), 2);
        assert_eq!(hypernet[0].items(), ["agm", "1.1"]);
        assert_eq!(hypernet[1].items(), ["ray"]);
        assert_eq!(directives.names().collect::<Vec<_>>(), ["hypernet", "other"]);
    }

    #[test]
    fn test_named_arguments() {
        let (_, directives) = parse("<x:te=0.3:unet=0.7>");
        let args = &directives.get("x").unwrap()[0];

        assert!(args.positional().is_empty());
        assert_eq!(args.get("te"), Some("0.3"));
        assert_eq!(args.get("unet"), Some("0.7"));
    }

    #[test]
    fn test_unclosed_directive_is_literal() {
        let (prompt, directives) = parse("a <lora:foo:0.5 b");
        assert_eq!(prompt, "a <lora:foo:0.5 b");
        assert!(directives.is_empty());
    }

    #[test]
    fn test_name_without_tokens_is_literal() {
        let (prompt, directives) = parse("<lora:> <lora>");
        assert_eq!(prompt, "<lora:> <lora>");
        assert!(directives.is_empty());
    }

    #[test]
    fn test_invalid_name_is_literal() {
        let (prompt, directives) = parse("<lo-ra:foo>");
        assert_eq!(prompt, "<lo-ra:foo>");
        assert!(directives.is_empty());
    }

    #[test]
    fn test_directives_do_not_nest() {
        let (prompt, directives) = parse("<a:<b:c>>");

        // `[^>]+` stops at the first closing bracket
        assert_eq!(prompt, ">");
        assert_eq!(directives.get("a").unwrap()[0].items(), ["<b", "c"]);
        assert!(directives.get("b").is_none());
    }

    #[test]
    fn test_adjacent_directives() {
        let (prompt, directives) = parse("<a:1><b:2>tail");
        assert_eq!(prompt, "tail");
        assert_eq!(directives.len(), 2);
    }

    #[test]
    fn test_empty_tokens_are_kept() {
        let (_, directives) = parse("<a:x::y>");
        assert_eq!(directives.get("a").unwrap()[0].items(), ["x", "", "y"]);
    }

    #[test]
    fn test_batch_uses_first_prompt_directives() {
        let (prompts, directives) = parse_batch(["<a:1> x", "<a:2> y"]);

        assert_eq!(prompts, [" x", " y"]);
        let expected: Directives = [("a", ParsedArguments::new(["1"]))].into_iter().collect();
        assert_eq!(directives, expected);
    }

    #[test]
    fn test_batch_first_prompt_without_directives() {
        let (prompts, directives) = parse_batch(vec!["x".to_owned(), "<a:2> y".to_owned()]);
        assert_eq!(prompts, ["x", " y"]);
        assert!(directives.is_empty());
    }

    #[test]
    fn test_empty_batch() {
        let (prompts, directives) = parse_batch(Vec::<String>::new());
        assert!(prompts.is_empty());
        assert!(directives.is_empty());
    }
}
