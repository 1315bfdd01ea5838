//! Per-request activation and deactivation of registered handlers.

use std::fmt;

use xnet_directive::{Directives, ParsedArguments};

use crate::{GenerationRequest, HandlerError, HandlerId, HandlerRegistry};

/// Lifecycle state of a [`Dispatcher`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DispatchState {
    /// No request in flight: before the first activation and after every
    /// deactivation.
    #[default]
    Idle,
    /// Handlers are active. `rounds` counts activations since the last
    /// deactivation (more than one means continuation passes).
    Activated { rounds: usize },
}

/// Lifecycle phase a diagnostic was raised in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Activation with the handler's resolved arguments.
    Activate,
    /// Activation with an empty argument list.
    Reset,
    /// Deactivation.
    Deactivate,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Activate => f.write_str("activating"),
            Self::Reset => f.write_str("resetting"),
            Self::Deactivate => f.write_str("deactivating"),
        }
    }
}

/// An isolated handler failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// Name the failing handler is registered under.
    pub handler: String,
    /// Phase the failure happened in.
    pub phase: Phase,
    /// Human-readable description, including the offending arguments.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} handler {}: {}", self.phase, self.handler, self.message)
    }
}

/// Batch metadata handed to an [`ActivationObserver`].
#[derive(Clone, Copy, Debug)]
pub struct BatchInfo<'a> {
    /// Index of the batch within the job.
    pub iteration: usize,
    /// Prompts of the batch.
    pub prompts: &'a [String],
    /// Seeds of the batch.
    pub seeds: &'a [u64],
    /// Variation seeds of the batch.
    pub subseeds: &'a [u64],
}

impl<'a> BatchInfo<'a> {
    fn from_request(request: &'a GenerationRequest) -> Self {
        Self {
            iteration: request.iteration,
            prompts: &request.prompts,
            seeds: &request.seeds,
            subseeds: &request.subseeds,
        }
    }
}

/// Side channel notified after every activation.
///
/// Owned by the hosting pipeline (for example a script runner). The dispatcher
/// only passes data through.
pub trait ActivationObserver: Send {
    /// Called once at the end of [`Dispatcher::activate`].
    fn after_activate(&mut self, batch: &BatchInfo<'_>, directives: &Directives);
}

/// Drives registered handlers through the per-request lifecycle.
///
/// Every registered handler is activated on every [`activate`](Self::activate)
/// call and deactivated exactly once per [`deactivate`](Self::deactivate) call,
/// whether or not the prompt mentions it. Handler failures are isolated: they
/// are logged, collected as [`Diagnostic`]s, and never abort the request.
///
/// Requests must not overlap: handler state is per dispatcher, not per request.
#[derive(Default)]
pub struct Dispatcher {
    registry: HandlerRegistry,
    observer: Option<Box<dyn ActivationObserver>>,
    state: DispatchState,
    diagnostics: Vec<Diagnostic>,
}

impl Dispatcher {
    /// Create a dispatcher with an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dispatcher over an existing registry.
    #[must_use]
    pub fn with_registry(registry: HandlerRegistry) -> Self {
        Self {
            registry,
            ..Self::default()
        }
    }

    /// Set the post-activation observer.
    #[must_use]
    pub fn with_observer<O: ActivationObserver + 'static>(mut self, observer: O) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// The handler registry.
    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Mutable access to the handler registry, e.g. for bootstrap.
    pub fn registry_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.registry
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// Handler failures isolated during the current request.
    ///
    /// Kept across continuation passes and after [`deactivate`](Self::deactivate),
    /// cleared when the next request is activated.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Drain the collected handler failures.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Clear the registry and return to [`DispatchState::Idle`].
    pub fn reset(&mut self) {
        self.registry.reset();
        self.state = DispatchState::Idle;
        self.diagnostics.clear();
    }

    /// Activate handlers for a request.
    ///
    /// Mentioned handlers are activated first, in directive order, with their
    /// resolved arguments. Every registered handler that was not successfully
    /// activated (unmentioned or failed) is then activated with no arguments.
    /// Finally the observer, if any, is notified.
    ///
    /// Calling this again before [`deactivate`](Self::deactivate) is a
    /// continuation pass; handlers replace their previous state. Activating a
    /// new request clears the diagnostics of the previous one.
    pub fn activate(&mut self, request: &mut GenerationRequest, directives: &Directives) {
        if self.state == DispatchState::Idle {
            self.diagnostics.clear();
        }

        let resolution = self.registry.resolve(directives);
        let mut activated: Vec<HandlerId> = Vec::with_capacity(resolution.len());

        for (&id, args) in &resolution {
            if self.call_activate(id, request, args, Phase::Activate) {
                activated.push(id);
            }
        }

        for id in self.registry.registered() {
            if !activated.contains(&id) {
                self.call_activate(id, request, &[], Phase::Reset);
            }
        }

        self.state = match self.state {
            DispatchState::Activated { rounds } => DispatchState::Activated { rounds: rounds + 1 },
            DispatchState::Idle => DispatchState::Activated { rounds: 1 },
        };
        tracing::debug!(
            handlers = self.registry.len(),
            mentioned = resolution.len(),
            state = ?self.state,
            "Activated handlers"
        );

        if let Some(observer) = &mut self.observer {
            observer.after_activate(&BatchInfo::from_request(request), directives);
        }
    }

    /// Deactivate handlers at the end of a request.
    ///
    /// Mentioned handlers are deactivated first, in directive order, then every
    /// remaining registered handler. Each handler is deactivated exactly once.
    pub fn deactivate(&mut self, request: &mut GenerationRequest, directives: &Directives) {
        if !matches!(self.state, DispatchState::Activated { .. }) {
            tracing::debug!(state = ?self.state, "Deactivating without a prior activation");
        }

        let resolution = self.registry.resolve(directives);

        for &id in resolution.keys() {
            self.call_deactivate(id, request);
        }

        for id in self.registry.registered() {
            if !resolution.contains_key(&id) {
                self.call_deactivate(id, request);
            }
        }

        self.state = DispatchState::Idle;
        tracing::debug!(handlers = self.registry.len(), "Deactivated handlers");
    }

    /// Returns true if the handler activated successfully.
    fn call_activate(
        &mut self,
        id: HandlerId,
        request: &mut GenerationRequest,
        args: &[ParsedArguments],
        phase: Phase,
    ) -> bool {
        let Some((name, handler)) = self.registry.slot_mut(id) else {
            return false;
        };
        let name = name.to_owned();

        match handler.activate(request, args) {
            Ok(()) => true,
            Err(error) => {
                let message = if args.is_empty() {
                    error.to_string()
                } else {
                    format!("{error} (arguments: {})", describe_args(args))
                };
                self.report(name, phase, &error, message);
                false
            }
        }
    }

    fn call_deactivate(&mut self, id: HandlerId, request: &mut GenerationRequest) {
        let Some((name, handler)) = self.registry.slot_mut(id) else {
            return;
        };
        let name = name.to_owned();

        if let Err(error) = handler.deactivate(request) {
            let message = error.to_string();
            self.report(name, Phase::Deactivate, &error, message);
        }
    }

    fn report(&mut self, handler: String, phase: Phase, error: &HandlerError, message: String) {
        tracing::error!(handler = %handler, phase = %phase, error = %error, "{message}");
        self.diagnostics.push(Diagnostic {
            handler,
            phase,
            message,
        });
    }
}

/// Render arguments as they were written: `[a:b], [c]`.
fn describe_args(args: &[ParsedArguments]) -> String {
    args.iter()
        .map(|a| format!("[{}]", a.items().join(":")))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::Handler;
    use pretty_assertions::assert_eq;
    use xnet_directive::{parse, parse_batch};

    type Log = Arc<Mutex<Vec<String>>>;

    /// Records every call into a shared log and keeps the last activation.
    struct Recorder {
        name: &'static str,
        log: Log,
        fail_with_args: bool,
        fail_deactivate: bool,
        last: Vec<String>,
    }

    impl Recorder {
        fn new(name: &'static str, log: &Log) -> Self {
            Self {
                name,
                log: Arc::clone(log),
                fail_with_args: false,
                fail_deactivate: false,
                last: Vec::new(),
            }
        }

        fn failing(mut self) -> Self {
            self.fail_with_args = true;
            self
        }

        fn failing_deactivate(mut self) -> Self {
            self.fail_deactivate = true;
            self
        }
    }

    impl Handler for Recorder {
        fn activate(
            &mut self,
            _request: &mut GenerationRequest,
            args: &[ParsedArguments],
        ) -> Result<(), HandlerError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("activate {} {}", self.name, args.len()));
            if self.fail_with_args && !args.is_empty() {
                return Err(HandlerError::Other("boom".to_owned()));
            }
            self.last = args.iter().flat_map(|a| a.items().to_vec()).collect();
            Ok(())
        }

        fn deactivate(&mut self, _request: &mut GenerationRequest) -> Result<(), HandlerError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("deactivate {}", self.name));
            if self.fail_deactivate {
                return Err(HandlerError::Other("cleanup failed".to_owned()));
            }
            Ok(())
        }
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[test]
    fn test_activate_mentioned_then_unmentioned() {
        let log = Log::default();
        let mut dispatcher = Dispatcher::new();
        dispatcher.registry_mut().register("a", Recorder::new("a", &log));
        dispatcher.registry_mut().register("b", Recorder::new("b", &log));
        dispatcher.registry_mut().register("c", Recorder::new("c", &log));

        let (_, directives) = parse("<c:x> <b:y:1> <b:z>");
        let mut request = GenerationRequest::default();
        dispatcher.activate(&mut request, &directives);

        assert_eq!(
            entries(&log),
            ["activate c 1", "activate b 2", "activate a 0"]
        );
        assert_eq!(dispatcher.state(), DispatchState::Activated { rounds: 1 });
    }

    #[test]
    fn test_deactivate_every_handler_once() {
        let log = Log::default();
        let mut dispatcher = Dispatcher::new();
        dispatcher.registry_mut().register("a", Recorder::new("a", &log));
        dispatcher.registry_mut().register("b", Recorder::new("b", &log));

        let (_, directives) = parse("<b:x> <unknown:y>");
        let mut request = GenerationRequest::default();
        dispatcher.activate(&mut request, &directives);
        log.lock().unwrap().clear();

        dispatcher.deactivate(&mut request, &directives);

        assert_eq!(entries(&log), ["deactivate b", "deactivate a"]);
        assert_eq!(dispatcher.state(), DispatchState::Idle);
    }

    #[test]
    fn test_alias_resolves_to_single_activation() {
        let log = Log::default();
        let mut dispatcher = Dispatcher::new();
        let id = dispatcher.registry_mut().register("lora", Recorder::new("lora", &log));
        dispatcher.registry_mut().register_alias("lyco", id).unwrap();

        let (_, directives) = parse("<lyco:x> <lora:y>");
        let mut request = GenerationRequest::default();
        dispatcher.activate(&mut request, &directives);
        dispatcher.deactivate(&mut request, &directives);

        assert_eq!(entries(&log), ["activate lora 2", "deactivate lora"]);
        let handler = dispatcher.registry().handler::<Recorder>("lora").unwrap();
        assert_eq!(handler.last, ["x", "y"]);
    }

    #[test]
    fn test_failure_is_isolated_and_handler_reset() {
        let log = Log::default();
        let mut dispatcher = Dispatcher::new();
        dispatcher
            .registry_mut()
            .register("bad", Recorder::new("bad", &log).failing());
        dispatcher.registry_mut().register("good", Recorder::new("good", &log));
        dispatcher.registry_mut().register("idle", Recorder::new("idle", &log));

        let (_, directives) = parse("<bad:x:1> <good:y>");
        let mut request = GenerationRequest::default();
        dispatcher.activate(&mut request, &directives);

        assert_eq!(
            entries(&log),
            [
                "activate bad 1",
                "activate good 1",
                "activate bad 0",
                "activate idle 0",
            ]
        );

        let diagnostics = dispatcher.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].handler, "bad");
        assert_eq!(diagnostics[0].phase, Phase::Activate);
        assert!(diagnostics[0].message.contains("[x:1]"));
        assert!(diagnostics[0].message.contains("boom"));
    }

    #[test]
    fn test_diagnostics_cleared_on_next_request() {
        let log = Log::default();
        let mut dispatcher = Dispatcher::new();
        dispatcher
            .registry_mut()
            .register("bad", Recorder::new("bad", &log).failing());

        let (_, failing) = parse("<bad:x>");
        let mut request = GenerationRequest::default();
        dispatcher.activate(&mut request, &failing);
        dispatcher.activate(&mut request, &failing);
        assert_eq!(dispatcher.diagnostics().len(), 2);

        dispatcher.deactivate(&mut request, &failing);
        assert_eq!(dispatcher.diagnostics().len(), 2);

        let mut request = GenerationRequest::default();
        dispatcher.activate(&mut request, &Directives::new());
        assert!(dispatcher.diagnostics().is_empty());
    }

    #[test]
    fn test_deactivate_failure_is_isolated() {
        let log = Log::default();
        let mut dispatcher = Dispatcher::new();
        dispatcher
            .registry_mut()
            .register("a", Recorder::new("a", &log).failing_deactivate());
        dispatcher.registry_mut().register("b", Recorder::new("b", &log));

        let directives = Directives::new();
        let mut request = GenerationRequest::default();
        dispatcher.activate(&mut request, &directives);
        dispatcher.deactivate(&mut request, &directives);

        assert!(entries(&log).contains(&"deactivate b".to_owned()));
        let diagnostics = dispatcher.take_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].phase, Phase::Deactivate);
        assert!(dispatcher.diagnostics().is_empty());
    }

    #[test]
    fn test_second_activation_replaces_state() {
        let log = Log::default();
        let mut dispatcher = Dispatcher::new();
        dispatcher.registry_mut().register("a", Recorder::new("a", &log));

        let mut request = GenerationRequest::default();
        let (_, first) = parse("<a:one>");
        dispatcher.activate(&mut request, &first);
        let (_, second) = parse("<a:two>");
        dispatcher.activate(&mut request, &second);

        let handler = dispatcher.registry().handler::<Recorder>("a").unwrap();
        assert_eq!(handler.last, ["two"]);
        assert_eq!(dispatcher.state(), DispatchState::Activated { rounds: 2 });
    }

    #[test]
    fn test_unmentioned_handler_is_cleared() {
        let log = Log::default();
        let mut dispatcher = Dispatcher::new();
        dispatcher.registry_mut().register("a", Recorder::new("a", &log));

        let mut request = GenerationRequest::default();
        let (_, first) = parse("<a:one>");
        dispatcher.activate(&mut request, &first);
        dispatcher.deactivate(&mut request, &first);
        dispatcher.activate(&mut request, &Directives::new());

        let handler = dispatcher.registry().handler::<Recorder>("a").unwrap();
        assert!(handler.last.is_empty());
    }

    #[test]
    fn test_unknown_directive_does_not_disturb_others() {
        let log = Log::default();
        let mut dispatcher = Dispatcher::new();
        dispatcher.registry_mut().register("a", Recorder::new("a", &log));

        let (_, directives) = parse("<nope:1> <a:x>");
        let mut request = GenerationRequest::default();
        dispatcher.activate(&mut request, &directives);

        assert_eq!(entries(&log), ["activate a 1"]);
        assert!(dispatcher.diagnostics().is_empty());
    }

    #[test]
    fn test_observer_receives_batch() {
        struct Capture(Arc<Mutex<Option<(usize, Vec<String>, Vec<u64>, Vec<String>)>>>);

        impl ActivationObserver for Capture {
            fn after_activate(&mut self, batch: &BatchInfo<'_>, directives: &Directives) {
                *self.0.lock().unwrap() = Some((
                    batch.iteration,
                    batch.prompts.to_vec(),
                    batch.seeds.to_vec(),
                    directives.names().map(str::to_owned).collect(),
                ));
            }
        }

        let captured = Arc::default();
        let mut dispatcher = Dispatcher::new().with_observer(Capture(Arc::clone(&captured)));

        let (prompts, directives) = parse_batch(["<a:1> x"]);
        let mut request = GenerationRequest::new(prompts).with_seeds(vec![42]);
        request.iteration = 3;
        dispatcher.activate(&mut request, &directives);

        let captured = captured.lock().unwrap().clone().unwrap();
        assert_eq!(captured.0, 3);
        assert_eq!(captured.1, [" x"]);
        assert_eq!(captured.2, [42]);
        assert_eq!(captured.3, ["a"]);
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let log = Log::default();
        let mut dispatcher = Dispatcher::new();
        dispatcher.registry_mut().register("a", Recorder::new("a", &log));
        dispatcher.activate(&mut GenerationRequest::default(), &Directives::new());

        dispatcher.reset();

        assert_eq!(dispatcher.state(), DispatchState::Idle);
        assert!(dispatcher.registry().is_empty());
    }

    #[test]
    fn test_describe_args() {
        let args = [
            ParsedArguments::new(["a", "b"]),
            ParsedArguments::new(["te=1"]),
        ];
        assert_eq!(describe_args(&args), "[a:b], [te=1]");
    }
}
