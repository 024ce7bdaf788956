//! Superseding a stored instance with an edited resubmission.
//!
//! Order matters: the occupant is copied and the copy saved as `deprecated`
//! before the occupant is deleted, so a failure at any step leaves the old
//! payload recoverable. Only then is the new payload resubmitted under the
//! freed identifier.
use ingest::Submission;
use store::{DocKind, StoreError};
use tracing::{info, warn};

use crate::gateway::{SubmissionGateway, SubmissionOutcome};

impl SubmissionGateway {
    pub(crate) fn deprecate(
        &self,
        conflict_id: &str,
        submission: &Submission,
        round: u32,
    ) -> SubmissionOutcome {
        let deprecated_id = match self.save_deprecated_copy(conflict_id) {
            Ok(id) => id,
            Err(err) => return self.hard_failure(submission, err.into()),
        };

        // Known boundary: the delete is unconditional. If a concurrent
        // deprecation already removed the occupant this is NotFound (logged).
        // If another submitter has since written a new instance here, this
        // removes that uncopied instance and its payload is lost even though
        // its submitter was told `Stored`.
        if let Err(err) = self.store.delete(conflict_id) {
            return self.hard_failure(submission, err.into());
        }

        info!(
            conflict_id,
            deprecated_id = %deprecated_id,
            round,
            "instance_deprecated"
        );
        self.submit_round(submission, round + 1)
    }

    /// Copy the occupant and save the copy as `deprecated`, returning its id.
    fn save_deprecated_copy(&self, conflict_id: &str) -> Result<String, StoreError> {
        let copy_id = self.store.copy(conflict_id)?;
        let saved = self.store.get(&copy_id).and_then(|mut copy| {
            copy.kind = DocKind::Deprecated;
            copy.orig_id = Some(conflict_id.to_string());
            self.store.save(&copy)
        });
        if let Err(err) = saved {
            // Do not leave a second live instance of the same payload behind.
            if let Err(cleanup) = self.store.delete(&copy_id) {
                warn!(copy_id = %copy_id, error = %cleanup, "deprecated_copy_cleanup_failed");
            }
            return Err(err);
        }
        Ok(copy_id)
    }
}
