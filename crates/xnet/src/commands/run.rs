//! `xnet run` command implementation.

use std::path::PathBuf;

use clap::Args;
use xnet_config::{CliSettings, Config};
use xnet_directive::{Directives, parse_batch};
use xnet_dispatch::{ActivationObserver, BatchInfo, Dispatcher, GenerationRequest};
use xnet_network::{CatalogLoader, DIRECTIVE_NAME, NetworkHandler, NetworkLoader, register_default_handlers};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the run command.
#[derive(Args)]
pub(crate) struct RunArgs {
    /// Prompts of one batch.
    #[arg(required = true)]
    prompts: Vec<String>,

    /// Path to configuration file (default: auto-discover xnet.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Network added to every prompt (overrides config, "None" disables).
    #[arg(long, env = "XNET_DEFAULT_NETWORK")]
    pinned: Option<String>,

    /// Multiplier for the pinned network (overrides config).
    #[arg(long)]
    multiplier: Option<f32>,

    /// Do not record network hashes in generation parameters.
    #[arg(long)]
    no_hashes: bool,

    /// Treat the run as a continuation pass of the same image.
    #[arg(long)]
    continuation: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl RunArgs {
    /// Execute the run command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails to load.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            default_network: self.pinned,
            default_multiplier: self.multiplier,
            add_hashes_to_params: self.no_hashes.then_some(false),
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        if let Some(path) = &config.config_path {
            output.info(&format!("Config: {}", path.display()));
        }
        output.info(&format!(
            "Catalog: {} networks",
            config.catalog.networks.len()
        ));

        let loader = CatalogLoader::new(config.catalog.networks);
        let mut dispatcher = Dispatcher::new().with_observer(TraceObserver);
        register_default_handlers(
            dispatcher.registry_mut(),
            NetworkHandler::new(loader, config.network),
        )?;

        let (prompts, directives) = parse_batch(&self.prompts);
        let mut request = GenerationRequest::new(prompts).with_continuation(self.continuation);

        dispatcher.activate(&mut request, &directives);
        let loaded = loaded_networks(&dispatcher);
        dispatcher.deactivate(&mut request, &directives);

        for diagnostic in dispatcher.diagnostics() {
            output.warning(&diagnostic.to_string());
        }
        output.highlight(&format!("Loaded {} networks", loaded.len()));

        let params: serde_json::Map<String, serde_json::Value> = request
            .extra_generation_params
            .iter()
            .map(|(key, value)| (key.clone(), value.clone().into()))
            .collect();
        let diagnostics: Vec<String> = dispatcher
            .diagnostics()
            .iter()
            .map(ToString::to_string)
            .collect();

        let report = serde_json::json!({
            "prompts": request.all_prompts,
            "loaded": loaded,
            "extra_generation_params": params,
            "comments": request.comments,
            "diagnostics": diagnostics,
        });

        output.result(&serde_json::to_string_pretty(&report)?)?;
        Ok(())
    }
}

/// Loaded networks as JSON objects.
fn loaded_networks(dispatcher: &Dispatcher) -> Vec<serde_json::Value> {
    let Some(handler) = dispatcher
        .registry()
        .handler::<NetworkHandler<CatalogLoader>>(DIRECTIVE_NAME)
    else {
        return Vec::new();
    };

    handler
        .loader()
        .loaded()
        .iter()
        .map(|network| {
            serde_json::json!({
                "name": network.name,
                "mentioned_name": network.mentioned_name,
                "te": network.te_multiplier,
                "unet": network.unet_multiplier,
                "dyn": network.dyn_dim,
            })
        })
        .collect()
}

/// Logs each activated batch.
struct TraceObserver;

impl ActivationObserver for TraceObserver {
    fn after_activate(&mut self, batch: &BatchInfo<'_>, directives: &Directives) {
        tracing::info!(
            iteration = batch.iteration,
            prompts = batch.prompts.len(),
            directives = ?directives.names().collect::<Vec<_>>(),
            "Activated batch"
        );
    }
}
