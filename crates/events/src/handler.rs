/// Execute an aggregate command deterministically (no IO, no async).
///
/// 1. **Decide**: `aggregate.handle(command)` validates and returns events
///    without touching state.
/// 2. **Evolve**: each event is applied in order.
///
/// If `handle` fails nothing is applied, which gives every command
/// all-or-nothing semantics. The returned events are what callers publish.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: arrears_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
