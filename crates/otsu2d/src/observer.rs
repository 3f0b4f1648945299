/// Hook interface for instrumented builds.
///
/// The engine reports coarse lifecycle events through this trait; the default
/// implementation does nothing, so production callers pay no cost beyond a
/// dynamic call per stage.
pub trait ProcessingObserver: Send + Sync {
    fn on_operation_start(&self, _operation: &str) {}
    fn on_operation_end(&self, _operation: &str, _success: bool) {}
    fn on_parameter_change(&self, _field: &str, _value: &str) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProcessingObserver for NoopObserver {}
