//! Composition trigger: claim one unused person image and one unused garment
//! image, hand them to the compositor, and record the result.
//!
//! Claimed records stay consumed when the compositor fails or times out. The
//! user is asked to send both images again.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tryon_core::error::{CompositionError, NotFoundError};
use tryon_core::{
    CompositionRecord, CompositionRequest, Compositor, ImageKind, SessionLedger, UserId,
};

pub struct CompositionTrigger {
    ledger: Arc<dyn SessionLedger>,
    compositor: Arc<dyn Compositor>,
    timeout: Duration,
}

impl CompositionTrigger {
    pub fn new(
        ledger: Arc<dyn SessionLedger>,
        compositor: Arc<dyn Compositor>,
        timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            compositor,
            timeout,
        }
    }

    pub async fn compose(&self, user: &UserId) -> Result<CompositionRecord, CompositionError> {
        let mut pair = Vec::with_capacity(2);
        for kind in ImageKind::PAIR {
            let record = self
                .ledger
                .find_latest_unused(user, kind)
                .await?
                .ok_or_else(|| CompositionError::PreconditionLost {
                    reason: NotFoundError::UnusedImage {
                        user: user.to_string(),
                        kind,
                    }
                    .to_string(),
                })?;
            pair.push(record);
        }
        let (person, garment) = (&pair[0], &pair[1]);

        self.ledger
            .claim_pair(user, &person.id, &garment.id)
            .await?;

        info!(
            user = %user,
            person = %person.id,
            garment = %garment.id,
            backend = self.compositor.name(),
            "Starting composition"
        );

        let request = CompositionRequest {
            user_id: user.clone(),
            person_image: person.local_path.clone(),
            garment_image: garment.local_path.clone(),
        };

        let output = match tokio::time::timeout(self.timeout, self.compositor.compose(request)).await
        {
            Ok(Ok(path)) => path,
            Ok(Err(e)) => {
                warn!(user = %user, error = %e, "Composition failed; inputs stay consumed");
                return Err(e);
            }
            Err(_) => {
                warn!(
                    user = %user,
                    timeout_secs = self.timeout.as_secs(),
                    "Composition timed out; inputs stay consumed"
                );
                return Err(CompositionError::Timeout {
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        let record = CompositionRecord::new(person, garment, output);
        self.ledger.append_composition(user, record.clone()).await?;
        info!(user = %user, output = %record.output_image.display(), "Composition stored");
        Ok(record)
    }
}
