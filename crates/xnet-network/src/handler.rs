//! The `lora` directive handler.

use indexmap::IndexMap;
use xnet_config::NetworkConfig;
use xnet_directive::ParsedArguments;
use xnet_dispatch::{GenerationRequest, Handler, HandlerError};

use crate::loader::{LoadBatch, NetworkLoader};

/// Generation parameter key holding recorded network hashes.
pub const HASHES_PARAM: &str = "Lora hashes";

/// Characters stripped from mention names before they are used as hash keys.
const HASH_KEY_STRIPPED: [char; 2] = [':', ','];

/// Argument that could not be coerced to a number.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Multiplier is not a number.
    #[error("{key} multiplier is not a number: {value:?}")]
    InvalidMultiplier {
        /// Argument name (`te` or `unet`).
        key: &'static str,
        /// Offending value.
        value: String,
    },
    /// Dimension is not an integer.
    #[error("{key} is not an integer: {value:?}")]
    InvalidDimension {
        /// Argument name (`dyn`).
        key: &'static str,
        /// Offending value.
        value: String,
    },
}

impl From<ParseError> for HandlerError {
    fn from(e: ParseError) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}

impl From<crate::LoadError> for HandlerError {
    fn from(e: crate::LoadError) -> Self {
        Self::Load(e.to_string())
    }
}

/// Handler for `<lora:name:te:unet:dyn>` directives.
///
/// Every activation replaces the loader's whole network set with the networks
/// named in the prompt (plus the pinned default network, if configured). An
/// activation with no arguments therefore unloads everything.
pub struct NetworkHandler<L> {
    loader: L,
    options: NetworkConfig,
    errors: IndexMap<String, usize>,
    last_batch: LoadBatch,
}

impl<L: NetworkLoader> NetworkHandler<L> {
    /// Create a handler delegating to `loader`.
    pub fn new(loader: L, options: NetworkConfig) -> Self {
        Self {
            loader,
            options,
            errors: IndexMap::new(),
            last_batch: LoadBatch::new(),
        }
    }

    /// The loading collaborator.
    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Handler options.
    pub fn options(&self) -> &NetworkConfig {
        &self.options
    }

    /// Mutable handler options. Read on every activation.
    pub fn options_mut(&mut self) -> &mut NetworkConfig {
        &mut self.options
    }

    /// Failed loads since the last activation, by requested name.
    pub fn errors(&self) -> &IndexMap<String, usize> {
        &self.errors
    }

    /// Batch handed to the loader by the most recent activation.
    pub fn last_batch(&self) -> &LoadBatch {
        &self.last_batch
    }

    /// Pinned network to add to this activation, if any.
    fn pinned_network(&self, args: &[ParsedArguments]) -> Option<String> {
        let pinned = self.options.pinned()?;
        if !self.loader.is_available(pinned) {
            return None;
        }
        let requested = args.iter().any(|a| a.positional_at(0) == Some(pinned));
        (!requested).then(|| pinned.to_owned())
    }

    fn record_hashes(&self, request: &mut GenerationRequest) {
        if !request.is_continuation {
            request.network_hashes.clear();
        }

        for network in self.loader.loaded() {
            if let Some(hash) = &network.shorthash
                && let Some(mentioned) = &network.mentioned_name
                && !hash.is_empty()
                && !mentioned.is_empty()
            {
                let key: String = mentioned
                    .chars()
                    .filter(|c| !HASH_KEY_STRIPPED.contains(c))
                    .collect();
                request.network_hashes.insert(key, hash.clone());
            }
        }

        if !request.network_hashes.is_empty() {
            let joined = request
                .network_hashes
                .iter()
                .map(|(name, hash)| format!("{name}: {hash}"))
                .collect::<Vec<_>>()
                .join(", ");
            request
                .extra_generation_params
                .insert(HASHES_PARAM.to_owned(), joined);
        }
    }
}

impl<L: NetworkLoader + 'static> Handler for NetworkHandler<L> {
    fn activate(
        &mut self,
        request: &mut GenerationRequest,
        args: &[ParsedArguments],
    ) -> Result<(), HandlerError> {
        self.errors.clear();

        let mut batch = LoadBatch::new();
        for entry in args {
            push_entry(&mut batch, entry)?;
        }

        // Prompts change only once every entry is known to be valid.
        if let Some(pinned) = self.pinned_network(args) {
            let multiplier = format_multiplier(self.options.default_multiplier);
            let synthetic = ParsedArguments::new([pinned.as_str(), multiplier.as_str()]);
            push_entry(&mut batch, &synthetic)?;

            let directive = synthetic.to_directive(crate::DIRECTIVE_NAME);
            for prompt in &mut request.all_prompts {
                prompt.push_str(&directive);
            }
        }

        tracing::debug!(networks = ?batch.names(), "Activating networks");
        self.last_batch = batch;

        let report = self.loader.load(&self.last_batch)?;
        for name in report.failed {
            *self.errors.entry(name).or_default() += 1;
        }

        if self.options.add_hashes_to_params {
            self.record_hashes(request);
        }

        Ok(())
    }

    fn deactivate(&mut self, request: &mut GenerationRequest) -> Result<(), HandlerError> {
        if !self.errors.is_empty() {
            let summary = self
                .errors
                .iter()
                .map(|(name, count)| format!("{name} ({count})"))
                .collect::<Vec<_>>()
                .join(", ");
            request.comment(format!("Networks with errors: {summary}"));
            self.errors.clear();
        }
        Ok(())
    }
}

/// Resolve one directive occurrence into a load request.
fn push_entry(batch: &mut LoadBatch, entry: &ParsedArguments) -> Result<(), HandlerError> {
    let name = entry.positional_at(0).ok_or(HandlerError::MissingName)?;

    let te = match entry.get("te").or_else(|| entry.positional_at(1)) {
        Some(value) => parse_multiplier("te", value)?,
        None => 1.0,
    };
    let unet = match entry.get("unet").or_else(|| entry.positional_at(2)) {
        Some(value) => parse_multiplier("unet", value)?,
        None => te,
    };
    let dyn_dim = entry
        .get("dyn")
        .or_else(|| entry.positional_at(3))
        .map(|value| parse_dimension("dyn", value))
        .transpose()?;

    batch.push(name, te, unet, dyn_dim);
    Ok(())
}

fn parse_multiplier(key: &'static str, value: &str) -> Result<f32, ParseError> {
    value
        .trim()
        .parse()
        .map_err(|_| ParseError::InvalidMultiplier {
            key,
            value: value.to_owned(),
        })
}

fn parse_dimension(key: &'static str, value: &str) -> Result<u32, ParseError> {
    value
        .trim()
        .parse()
        .map_err(|_| ParseError::InvalidDimension {
            key,
            value: value.to_owned(),
        })
}

/// Format a multiplier the way it is written in prompts: whole numbers keep a
/// trailing `.0`.
pub(crate) fn format_multiplier(value: f32) -> String {
    let text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        format!("{text}.0")
    } else {
        text
    }
}
