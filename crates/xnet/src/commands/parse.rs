//! `xnet parse` command implementation.

use clap::Args;
use xnet_directive::parse_batch;

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the parse command.
#[derive(Args)]
pub(crate) struct ParseArgs {
    /// Prompts of one batch. Only the first prompt's directives are reported.
    #[arg(required = true)]
    prompts: Vec<String>,
}

impl ParseArgs {
    /// Execute the parse command.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let (prompts, directives) = parse_batch(&self.prompts);
        let report = serde_json::json!({
            "prompts": prompts,
            "directives": directives,
        });

        output.result(&serde_json::to_string_pretty(&report)?)?;
        Ok(())
    }
}
