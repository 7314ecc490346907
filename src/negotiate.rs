//! Capability negotiation: try profiles in preference order, keep the first
//! one that works.

use tracing::debug;

/// Every profile was tried and none succeeded.
#[derive(Debug)]
pub struct Exhausted<P, E> {
    /// Profiles in the order they were attempted.
    pub attempted: Vec<P>,
    /// The error from the last attempt, `None` if `profiles` was empty.
    pub last_error: Option<E>,
}

/// Calls `attempt` for each profile in order and returns the first success
/// together with the profile that produced it.
pub fn first_supported<P, T, E, F>(profiles: &[P], mut attempt: F) -> Result<(P, T), Exhausted<P, E>>
where
    P: Copy + std::fmt::Display,
    E: std::fmt::Display,
    F: FnMut(P) -> Result<T, E>,
{
    let mut attempted = Vec::with_capacity(profiles.len());
    let mut last_error = None;

    for &profile in profiles {
        attempted.push(profile);
        match attempt(profile) {
            Ok(value) => return Ok((profile, value)),
            Err(err) => {
                debug!(%profile, error = %err, "profile rejected, trying next");
                last_error = Some(err);
            }
        }
    }

    Err(Exhausted {
        attempted,
        last_error,
    })
}
