//! Write and delete guards evaluated against the current persisted secret.
//!
//! Options run in declaration order and the first rejection aborts the call
//! before anything reaches the backend.

use tracing::warn;

use super::secret::Secret;
use crate::errors::{ConnectionError, Result};

/// Decides whether a write may proceed; may adjust the desired secret.
pub trait WriteOption: Send + Sync {
    fn apply(&self, current: &Secret, desired: &mut Secret) -> Result<()>;
}

impl<F> WriteOption for F
where
    F: Fn(&Secret, &mut Secret) -> Result<()> + Send + Sync,
{
    fn apply(&self, current: &Secret, desired: &mut Secret) -> Result<()> {
        self(current, desired)
    }
}

/// Decides whether a delete may proceed, given the current and requested secret.
pub trait DeleteOption: Send + Sync {
    fn apply(&self, current: &Secret, requested: &Secret) -> Result<()>;
}

impl<F> DeleteOption for F
where
    F: Fn(&Secret, &Secret) -> Result<()> + Send + Sync,
{
    fn apply(&self, current: &Secret, requested: &Secret) -> Result<()> {
        self(current, requested)
    }
}

pub fn apply_write_options(
    options: &[&dyn WriteOption],
    current: &Secret,
    desired: &mut Secret,
) -> Result<()> {
    for option in options {
        option.apply(current, desired).inspect_err(|e| {
            warn!(secret = %desired.scoped_name, error = %e, "Write rejected by option");
        })?;
    }
    Ok(())
}

pub fn apply_delete_options(
    options: &[&dyn DeleteOption],
    current: &Secret,
    requested: &Secret,
) -> Result<()> {
    for option in options {
        option.apply(current, requested).inspect_err(|e| {
            warn!(secret = %requested.scoped_name, error = %e, "Delete rejected by option");
        })?;
    }
    Ok(())
}

/// Ownership guard: only the recorded owner (or anyone, if none is recorded)
/// may change a secret.
///
/// Writing to an unowned secret whose type differs from the declared type is
/// refused, so an externally created secret is never silently re-typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MustBeOwnedBy {
    uid: String,
}

impl MustBeOwnedBy {
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into() }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }
}

impl WriteOption for MustBeOwnedBy {
    fn apply(&self, current: &Secret, desired: &mut Secret) -> Result<()> {
        match current.owner_uid() {
            None => match (current.secret_type(), desired.secret_type()) {
                (Some(have), Some(want)) if have != want => {
                    Err(ConnectionError::type_conflict(have, want))
                }
                _ => Ok(()),
            },
            Some(owner) if owner == self.uid => Ok(()),
            Some(owner) => Err(ConnectionError::not_owned(&self.uid, owner)),
        }
    }
}

impl DeleteOption for MustBeOwnedBy {
    fn apply(&self, current: &Secret, _requested: &Secret) -> Result<()> {
        match current.owner_uid() {
            None => Ok(()),
            Some(owner) if owner == self.uid => Ok(()),
            Some(owner) => Err(ConnectionError::not_owned(&self.uid, owner)),
        }
    }
}
