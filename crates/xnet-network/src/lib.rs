//! Network directive handler.
//!
//! Implements `<lora:name:te:unet:dyn>` directives on top of `xnet-dispatch`:
//!
//! - `name` (required) selects the network
//! - `te` text encoder multiplier, default `1.0`
//! - `unet` UNet multiplier, default `te`
//! - `dyn` dynamic dimension, default none
//!
//! Each value may also be given by key (`te=0.5`), which takes precedence over
//! its position. Loading itself is delegated to a [`NetworkLoader`].
//!
//! # Example
//!
//! ```
//! use xnet_config::{CatalogEntry, NetworkConfig};
//! use xnet_directive::parse_batch;
//! use xnet_dispatch::{Dispatcher, GenerationRequest};
//! use xnet_network::{CatalogLoader, NetworkHandler, register_default_handlers};
//!
//! let loader = CatalogLoader::new([CatalogEntry {
//!     name: "ink".to_owned(),
//!     alias: None,
//!     hash: Some("0a1b2c3d".to_owned()),
//! }]);
//!
//! let mut dispatcher = Dispatcher::new();
//! register_default_handlers(
//!     dispatcher.registry_mut(),
//!     NetworkHandler::new(loader, NetworkConfig::default()),
//! )
//! .unwrap();
//!
//! let (prompts, directives) = parse_batch(["a harbor <lyco:ink:0.6>"]);
//! let mut request = GenerationRequest::new(prompts);
//!
//! dispatcher.activate(&mut request, &directives);
//! assert_eq!(request.extra_generation_params["Lora hashes"], "ink: 0a1b2c3d");
//! dispatcher.deactivate(&mut request, &directives);
//! ```

mod handler;
mod loader;

pub use handler::{HASHES_PARAM, NetworkHandler, ParseError};
pub use loader::{CatalogLoader, LoadBatch, LoadError, LoadReport, LoadedNetwork, NetworkLoader};

use xnet_dispatch::{HandlerId, HandlerRegistry, RegistryError};

/// Directive name served by [`NetworkHandler`].
pub const DIRECTIVE_NAME: &str = "lora";

/// Alternative directive name for the same handler.
pub const DIRECTIVE_ALIAS: &str = "lyco";

/// Register the network handler under `lora` with alias `lyco`.
///
/// Replaces any handler already registered under these names.
pub fn register_default_handlers<L: NetworkLoader + 'static>(
    registry: &mut HandlerRegistry,
    handler: NetworkHandler<L>,
) -> Result<HandlerId, RegistryError> {
    let id = registry.register(DIRECTIVE_NAME, handler);
    registry.register_alias(DIRECTIVE_ALIAS, id)?;
    Ok(id)
}
