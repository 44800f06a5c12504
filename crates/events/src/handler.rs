/// Decide and evolve in one step, without a store.
///
/// Runs `handle` and folds every produced event back into the aggregate. Used by
/// domain tests and by callers that only need the resulting in-memory state; the
/// dispatcher in `rentease-infra` does the same with persistence in between.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: rentease_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
