use arrears_core::AggregateId;

/// A command targets a specific aggregate.
///
/// Commands are **intent** ("send reminder X"); events are the accepted facts
/// ("reminder X sent at T"). A command is rejected as a whole if any check
/// fails, so one command maps to one atomic aggregate transition.
///
/// `target_aggregate_id()` lets the dispatcher route a command to its
/// aggregate and use it as the unit of concurrency control: different
/// aggregates can be processed in parallel, one aggregate has a single writer.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_aggregate_id(&self) -> AggregateId;
}
