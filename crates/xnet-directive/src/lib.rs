//! Inline prompt directive parsing.
//!
//! Prompts may carry directives of the form `<name:arg1:arg2:...>`. This crate
//! extracts them from the prompt text and splits each occurrence's tokens into
//! positional and named (`key=value`) arguments.
//!
//! Parsing is pure: nothing here knows which directive names are meaningful.
//! Resolving names to handlers is the job of `xnet-dispatch`.
//!
//! # Example
//!
//! ```
//! use xnet_directive::parse;
//!
//! let (prompt, directives) = parse("a castle <lora:stone:0.5> at dusk");
//! assert_eq!(prompt, "a castle  at dusk");
//!
//! let occurrences = directives.get("lora").unwrap();
//! assert_eq!(occurrences[0].positional(), ["stone", "0.5"]);
//! ```

mod args;
mod parser;

pub use args::ParsedArguments;
pub use parser::{Directives, parse, parse_batch};
