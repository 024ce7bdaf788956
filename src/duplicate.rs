//! Recording an identical resubmission as a `duplicate`.
//!
//! The payload is posted again under a fresh identifier so the retry stays
//! auditable, then reclassified. The original instance is untouched.
use ingest::Submission;
use store::{DocKind, InstanceDocument, StoreError};
use tracing::{info, warn};

use crate::endpoint::PostOptions;
use crate::gateway::{SubmissionGateway, SubmissionOutcome};

impl SubmissionGateway {
    pub(crate) fn mark_duplicate(
        &self,
        conflict_id: &str,
        submission: &Submission,
    ) -> SubmissionOutcome {
        let options = PostOptions::with_uid(self.store.new_id());
        let id = match self.post(submission, &options) {
            Ok(id) => id,
            Err(err) => return self.hard_failure(submission, err),
        };

        match self.record_duplicate(&id, conflict_id, submission) {
            Ok(document) => {
                info!(id = %document.id, conflict_id, "duplicate_recorded");
                SubmissionOutcome::Stored(document)
            }
            Err(err) => self.hard_failure(submission, err.into()),
        }
    }

    fn record_duplicate(
        &self,
        id: &str,
        conflict_id: &str,
        submission: &Submission,
    ) -> Result<InstanceDocument, StoreError> {
        for (name, attachment) in submission.attachments() {
            if let Err(err) = self.store.attach(id, name, attachment) {
                warn!(id, name = %name, error = %err, "duplicate_attachment_failed");
            }
        }
        let mut duplicate = self.store.get(id)?;
        duplicate.mark(
            DocKind::Duplicate,
            format!("Form is a duplicate of another! ({conflict_id})"),
        );
        self.store.save(&duplicate)?;
        Ok(duplicate)
    }
}
