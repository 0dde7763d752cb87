/// Run a command against an in-memory aggregate: decide, then apply.
///
/// No persistence or publication; used by domain tests and by coordinators
/// that preview a state change. The full pipeline lives in
/// `CommandDispatcher::dispatch` in `ledgerdesk-infra`.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: ledgerdesk_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
