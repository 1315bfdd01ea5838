//! Directive argument parsing.
//!
//! Splits the `:`-delimited tokens of one directive occurrence into
//! positional arguments and `key=value` named arguments.

use indexmap::IndexMap;

/// Parsed arguments from one directive occurrence.
///
/// Built from the raw token list of `<name:tok1:tok2:...>`. A token that splits
/// into exactly two parts at `=` is a named argument; every other token is
/// positional. Later duplicate keys overwrite earlier ones.
///
/// Two instances are equal when their source token sequences are equal, so a
/// handler can tell whether an item was already requested explicitly.
///
/// # Example
///
/// ```
/// use xnet_directive::ParsedArguments;
///
/// let args = ParsedArguments::new(["foo", "0.8", "unet=0.4"]);
/// assert_eq!(args.positional(), ["foo", "0.8"]);
/// assert_eq!(args.get("unet"), Some("0.4"));
/// ```
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ParsedArguments {
    /// Raw tokens in source order.
    items: Vec<String>,
    /// Tokens that are not `key=value` pairs, in source order.
    positional: Vec<String>,
    /// `key=value` tokens.
    named: IndexMap<String, String>,
}

impl ParsedArguments {
    /// Parse a token sequence into positional and named arguments.
    #[must_use]
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = Self::default();

        for token in tokens {
            let token = token.into();
            match split_named(&token) {
                Some((key, value)) => {
                    args.named.insert(key.to_owned(), value.to_owned());
                }
                None => args.positional.push(token.clone()),
            }
            args.items.push(token);
        }

        args
    }

    /// Raw tokens in source order.
    #[must_use]
    pub fn items(&self) -> &[String] {
        &self.items
    }

    /// Positional arguments in source order.
    #[must_use]
    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    /// Positional argument at `index`, if present.
    #[must_use]
    pub fn positional_at(&self, index: usize) -> Option<&str> {
        self.positional.get(index).map(String::as_str)
    }

    /// Named arguments.
    #[must_use]
    pub fn named(&self) -> &IndexMap<String, String> {
        &self.named
    }

    /// Get a named argument by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.named.get(key).map(String::as_str)
    }

    /// True if the occurrence carried no tokens at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Reconstruct directive text `<name:tok1:tok2>` from the raw tokens.
    ///
    /// # Example
    ///
    /// ```
    /// use xnet_directive::ParsedArguments;
    ///
    /// let args = ParsedArguments::new(["detail", "1.0"]);
    /// assert_eq!(args.to_directive("lora"), "<lora:detail:1.0>");
    /// ```
    #[must_use]
    pub fn to_directive(&self, name: &str) -> String {
        format!("<{name}:{}>", self.items.join(":"))
    }
}

impl PartialEq for ParsedArguments {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl Eq for ParsedArguments {}

/// Split a token into `(key, value)` if it has exactly one `=`.
fn split_named(token: &str) -> Option<(&str, &str)> {
    let mut parts = token.splitn(3, '=');
    let key = parts.next()?;
    let value = parts.next()?;

    if parts.next().is_some() {
        return None;
    }

    Some((key, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_positional_only() {
        let args = ParsedArguments::new(["foo", "0.5"]);
        assert_eq!(args.positional(), ["foo", "0.5"]);
        assert!(args.named().is_empty());
    }

    #[test]
    fn test_named_only() {
        let args = ParsedArguments::new(["te=0.3", "unet=0.7"]);
        assert!(args.positional().is_empty());
        assert_eq!(args.get("te"), Some("0.3"));
        assert_eq!(args.get("unet"), Some("0.7"));
    }

    #[test]
    fn test_mixed_keeps_positional_order() {
        let args = ParsedArguments::new(["a", "dyn=8", "b", "c"]);
        assert_eq!(args.positional(), ["a", "b", "c"]);
        assert_eq!(args.get("dyn"), Some("8"));
        assert_eq!(args.items(), ["a", "dyn=8", "b", "c"]);
    }

    #[test]
    fn test_duplicate_key_last_wins() {
        let args = ParsedArguments::new(["te=0.1", "te=0.9"]);
        assert_eq!(args.get("te"), Some("0.9"));
        assert_eq!(args.named().len(), 1);
    }

    #[test]
    fn test_double_equals_is_positional() {
        let args = ParsedArguments::new(["a=b=c"]);
        assert_eq!(args.positional(), ["a=b=c"]);
        assert!(args.named().is_empty());
    }

    #[test]
    fn test_empty_key_or_value_is_named() {
        let args = ParsedArguments::new(["=x", "y="]);
        assert!(args.positional().is_empty());
        assert_eq!(args.get(""), Some("x"));
        assert_eq!(args.get("y"), Some(""));
    }

    #[test]
    fn test_positional_at() {
        let args = ParsedArguments::new(["foo", "te=1"]);
        assert_eq!(args.positional_at(0), Some("foo"));
        assert_eq!(args.positional_at(1), None);
    }

    #[test]
    fn test_equality_by_tokens() {
        let a = ParsedArguments::new(["foo", "0.5"]);
        let b = ParsedArguments::new(vec!["foo".to_owned(), "0.5".to_owned()]);
        let c = ParsedArguments::new(["foo", "0.50"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_equality_is_order_sensitive() {
        let a = ParsedArguments::new(["te=1", "unet=2"]);
        let b = ParsedArguments::new(["unet=2", "te=1"]);
        assert_eq!(a.named().get("te"), b.named().get("te"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty() {
        let args = ParsedArguments::default();
        assert!(args.is_empty());
        assert_eq!(args.positional_at(0), None);
    }

    #[test]
    fn test_to_directive() {
        let args = ParsedArguments::new(["foo", "te=0.3"]);
        assert_eq!(args.to_directive("lora"), "<lora:foo:te=0.3>");
    }
}
