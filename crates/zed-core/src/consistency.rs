//! Consistency-mode selection from command flags.

use zed_proto::v1::{Consistency, ZedToken};

use crate::error::{ZedError, ZedResult};

/// The consistency flags a query command accepts.
///
/// Exactly one mode may be selected; when none is, minimize-latency is the
/// default.
#[derive(Debug, Clone, Default)]
pub struct ConsistencyArgs {
    /// `--consistency-full`: evaluate at the head revision.
    pub fully_consistent: bool,
    /// `--consistency-at-least <token>`: at least as fresh as the token.
    pub at_least_as_fresh: Option<String>,
    /// `--consistency-at-exactly <token>`: exactly the named snapshot.
    pub at_exact_snapshot: Option<String>,
    /// `--consistency-min-latency`: lowest-latency revision (the default).
    pub minimize_latency: bool,
}

impl ConsistencyArgs {
    /// Resolves the flags into a wire [`Consistency`].
    ///
    /// # Errors
    ///
    /// Returns [`ZedError::Validation`] when more than one mode is selected.
    pub fn resolve(&self) -> ZedResult<Consistency> {
        let selected = usize::from(self.fully_consistent)
            + usize::from(self.at_least_as_fresh.is_some())
            + usize::from(self.at_exact_snapshot.is_some())
            + usize::from(self.minimize_latency);
        if selected > 1 {
            return Err(ZedError::Validation(
                "at most one consistency flag may be set".to_owned(),
            ));
        }

        if self.fully_consistent {
            Ok(Consistency::fully_consistent())
        } else if let Some(token) = &self.at_least_as_fresh {
            Ok(Consistency::at_least_as_fresh(ZedToken {
                token: token.clone(),
            }))
        } else if let Some(token) = &self.at_exact_snapshot {
            Ok(Consistency::at_exact_snapshot(ZedToken {
                token: token.clone(),
            }))
        } else {
            Ok(Consistency::minimize_latency())
        }
    }
}
