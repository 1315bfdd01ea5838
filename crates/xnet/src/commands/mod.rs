//! CLI command implementations.

pub(crate) mod meta;
pub(crate) mod parse;
pub(crate) mod run;

pub(crate) use meta::MetaArgs;
pub(crate) use parse::ParseArgs;
pub(crate) use run::RunArgs;
