//! State transitions shared by the list-backed ledgers.

use tryon_core::error::{LedgerError, NotFoundError, ReclassifyError};
use tryon_core::{AttachmentRecord, ImageKind, UserId};

/// Check that `record_id` may become `new_kind` and return its index.
pub(crate) fn reclassify_target(
    records: &[AttachmentRecord],
    record_id: &str,
    new_kind: ImageKind,
) -> Result<usize, ReclassifyError> {
    if !new_kind.is_classified() {
        return Err(ReclassifyError::TargetUnclassified);
    }
    let idx = records
        .iter()
        .position(|r| r.id == record_id)
        .ok_or_else(|| ReclassifyError::UnknownRecord {
            record_id: record_id.to_string(),
        })?;
    check_reclassifiable(&records[idx])?;
    Ok(idx)
}

pub(crate) fn check_reclassifiable(record: &AttachmentRecord) -> Result<(), ReclassifyError> {
    if record.consumed {
        return Err(ReclassifyError::AlreadyConsumed {
            record_id: record.id.clone(),
        });
    }
    if record.declared_type.is_classified() {
        return Err(ReclassifyError::NotUnclassified {
            record_id: record.id.clone(),
            current: record.declared_type,
        });
    }
    Ok(())
}

fn position(records: &[AttachmentRecord], user: &UserId, record_id: &str) -> Result<usize, LedgerError> {
    records
        .iter()
        .position(|r| r.id == record_id)
        .ok_or_else(|| {
            NotFoundError::Record {
                user: user.to_string(),
                record_id: record_id.to_string(),
            }
            .into()
        })
}

/// Set `consumed` on one record. Returns the record and whether it changed.
pub(crate) fn mark_consumed(
    records: &mut [AttachmentRecord],
    user: &UserId,
    record_id: &str,
) -> Result<(AttachmentRecord, bool), LedgerError> {
    let idx = position(records, user, record_id)?;
    let changed = !records[idx].consumed;
    records[idx].consumed = true;
    Ok((records[idx].clone(), changed))
}

/// Consume both records, or neither.
pub(crate) fn claim_pair(
    records: &mut [AttachmentRecord],
    user: &UserId,
    person_id: &str,
    garment_id: &str,
) -> Result<(), LedgerError> {
    let person = position(records, user, person_id)?;
    let garment = position(records, user, garment_id)?;
    for idx in [person, garment] {
        if records[idx].consumed {
            return Err(LedgerError::AlreadyConsumed {
                record_id: records[idx].id.clone(),
            });
        }
    }
    records[person].consumed = true;
    records[garment].consumed = true;
    Ok(())
}
