//! Handler trait.

use std::any::Any;

use xnet_directive::ParsedArguments;

use crate::GenerationRequest;

/// Stateful effect handler for one directive family.
///
/// A handler is activated once per request with the arguments of every
/// directive that resolved to it, in prompt order. When the prompt does not
/// mention the handler (or its activation failed) it is activated again with an
/// empty argument list, and in that case all of its effects must be disabled.
///
/// `activate` may be called several times before `deactivate` (continuation
/// passes). Each call replaces the state of the previous one completely, except
/// for state the handler explicitly keeps across continuation passes.
///
/// # Thread Safety
///
/// Handlers implement `Send` only. A [`Dispatcher`](crate::Dispatcher) owns its
/// handlers and drives one request at a time.
pub trait Handler: Any + Send {
    /// Enable the handler's effects for this request.
    fn activate(
        &mut self,
        request: &mut GenerationRequest,
        args: &[ParsedArguments],
    ) -> Result<(), HandlerError>;

    /// Housekeeping at the end of the request.
    fn deactivate(&mut self, request: &mut GenerationRequest) -> Result<(), HandlerError>;
}

/// Failure inside a handler's `activate` or `deactivate`.
///
/// Always isolated by the dispatcher; never propagated to the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A directive did not name the item it refers to.
    #[error("directive is missing a required item name")]
    MissingName,
    /// An argument could not be interpreted.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The external loading collaborator failed.
    #[error("load failed: {0}")]
    Load(String),
    /// Any other handler-specific failure.
    #[error("{0}")]
    Other(String),
}
