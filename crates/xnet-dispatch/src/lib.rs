//! Handler registry and dispatch for prompt directives.
//!
//! Directives parsed by `xnet-directive` are resolved to [`Handler`]s through a
//! [`HandlerRegistry`] and driven through a strict per-request lifecycle by the
//! [`Dispatcher`].
//!
//! # Lifecycle
//!
//! 1. [`Dispatcher::activate`] calls every mentioned handler with its arguments,
//!    then every other registered handler with an empty argument list, so each
//!    handler ends the call in a freshly defined state.
//! 2. [`Dispatcher::deactivate`] calls `deactivate` exactly once on every
//!    registered handler.
//!
//! A failing handler never aborts the request: the failure is logged, recorded
//! as a [`Diagnostic`], and the handler is reset through the empty-argument path.
//!
//! # Example
//!
//! ```
//! use xnet_directive::{ParsedArguments, parse};
//! use xnet_dispatch::{Dispatcher, GenerationRequest, Handler, HandlerError};
//!
//! #[derive(Default)]
//! struct Style {
//!     active: Vec<String>,
//! }
//!
//! impl Handler for Style {
//!     fn activate(
//!         &mut self,
//!         _request: &mut GenerationRequest,
//!         args: &[ParsedArguments],
//!     ) -> Result<(), HandlerError> {
//!         self.active = args.iter().filter_map(|a| a.positional_at(0)).map(str::to_owned).collect();
//!         Ok(())
//!     }
//!
//!     fn deactivate(&mut self, _request: &mut GenerationRequest) -> Result<(), HandlerError> {
//!         self.active.clear();
//!         Ok(())
//!     }
//! }
//!
//! let mut dispatcher = Dispatcher::new();
//! dispatcher.registry_mut().register("style", Style::default());
//!
//! let (prompt, directives) = parse("a portrait <style:ink>");
//! let mut request = GenerationRequest::new(vec![prompt]);
//!
//! dispatcher.activate(&mut request, &directives);
//! assert_eq!(dispatcher.registry().handler::<Style>("style").unwrap().active, ["ink"]);
//!
//! dispatcher.deactivate(&mut request, &directives);
//! assert!(dispatcher.registry().handler::<Style>("style").unwrap().active.is_empty());
//! ```

mod dispatcher;
mod handler;
mod registry;
mod request;

pub use dispatcher::{ActivationObserver, BatchInfo, Diagnostic, DispatchState, Dispatcher, Phase};
pub use handler::{Handler, HandlerError};
pub use registry::{HandlerId, HandlerRegistry, RegistryError, Resolution};
pub use request::GenerationRequest;
