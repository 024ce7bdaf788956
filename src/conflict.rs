//! Conflict resolution.
//!
//! Runs when the endpoint reports that the payload's identifier is already
//! occupied. The occupant is loaded and its payload digest compared with the
//! new payload's: equal digests mean a client retry, recorded as a
//! `duplicate`; different digests mean an edit that supersedes the occupant.
use ingest::{Submission, same_content};
use tracing::{debug, error};

use crate::gateway::{SubmissionGateway, SubmissionOutcome};

impl SubmissionGateway {
    pub(crate) fn resolve_conflict(&self, submission: &Submission, round: u32) -> SubmissionOutcome {
        let conflict_id = self.extractor.extract(submission.payload());
        if conflict_id.is_empty() {
            // Continue anyway; the lookup below fails and the payload lands in the failure log.
            error!(
                strategies = ?self.extractor.strategy_names(),
                bytes = submission.len(),
                "identifier_missing"
            );
        }

        let existing = match self.store.get(&conflict_id) {
            Ok(existing) => existing,
            Err(err) => return self.hard_failure(submission, err.into()),
        };

        if same_content(submission.payload(), &existing.payload) {
            debug!(conflict_id = %conflict_id, "conflict_is_duplicate");
            self.mark_duplicate(&conflict_id, submission)
        } else {
            debug!(conflict_id = %conflict_id, kind = %existing.kind, "conflict_is_edit");
            self.deprecate(&conflict_id, submission, round)
        }
    }
}
