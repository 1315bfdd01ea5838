//! `xnet meta` command implementation.

use std::path::PathBuf;

use clap::Args;
use xnet_meta::{SidecarReader, UserMetadata};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the meta command.
#[derive(Args)]
pub(crate) struct MetaArgs {
    /// Artifact file whose `.json` sidecar is read.
    file: PathBuf,

    /// Fail instead of printing an empty document when the sidecar is invalid.
    #[arg(long)]
    strict: bool,
}

impl MetaArgs {
    /// Execute the meta command.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let reader = SidecarReader::new();
        let sidecar = SidecarReader::sidecar_path(&self.file);

        let metadata = match reader.try_read(&self.file) {
            Ok(Some(metadata)) => metadata,
            Ok(None) => {
                output.info(&format!("No sidecar at {}", sidecar.display()));
                UserMetadata::new()
            }
            Err(e) if self.strict => return Err(e.into()),
            Err(e) => {
                output.warning(&e.to_string());
                UserMetadata::new()
            }
        };

        output.result(&serde_json::to_string_pretty(&metadata)?)?;
        Ok(())
    }
}
