//! Pre-enqueue validation of fetched batches.

use serde_json::Value;

use crate::error::FetchError;
use crate::error::OplogOutOfOrder;
use crate::error::OplogStartMissing;
use crate::fetcher::BatchStats;
use crate::fetcher::StartingPoint;
use crate::op_time::OpTime;
use crate::op_time::Timestamp;

/// Validates one batch of documents returned from tailing the remote oplog.
///
/// `first` must be true while no non-empty batch has been accepted on the
/// current cursor. `last_ts` is the position the cursor was opened at.
///
/// Checks, in order:
/// - an empty first batch is fatal when a fresher sync source is required;
///   any other empty batch yields zeroed stats;
/// - the first document of a first batch must sit exactly at `last_ts`,
///   anything else means the source no longer contains our position;
/// - every document must carry `ts` and `t`;
/// - timestamps must be strictly increasing, both within the batch and
///   against `last_ts`;
/// - a first batch holding nothing but the position sentinel is fatal when
///   a fresher sync source is required.
///
/// On success returns the stats for the batch. Validation is pure:
/// validating the same batch twice yields identical stats.
pub fn validate_documents(
    documents: &[Value],
    first: bool,
    last_ts: Timestamp,
    starting_point: StartingPoint,
    require_fresher_sync_source: bool,
) -> Result<BatchStats, FetchError> {
    if documents.is_empty() {
        if first && require_fresher_sync_source {
            return Err(FetchError::InvalidSyncSource {
                reason: format!("sync source has no entries newer than ts {}", last_ts),
            });
        }
        return Ok(BatchStats::default());
    }

    let mut stats = BatchStats::default();
    let mut prev_ts = last_ts;
    let mut last_document = OpTime::default();

    for (i, doc) in documents.iter().enumerate() {
        let op_time = OpTime::parse_from_doc(doc)?;
        let bytes = doc_bytes(doc);

        stats.network_document_count += 1;
        stats.network_document_bytes += bytes;
        last_document = op_time;

        if i == 0 && first {
            if op_time.timestamp != last_ts {
                return Err(OplogStartMissing {
                    expected: last_ts,
                    got: op_time.timestamp,
                }
                .into());
            }
            if starting_point == StartingPoint::SkipFirstDoc {
                // The sentinel is counted on the network side only.
                continue;
            }
        } else if op_time.timestamp <= prev_ts {
            return Err(OplogOutOfOrder {
                prev: prev_ts,
                next: op_time.timestamp,
            }
            .into());
        }

        prev_ts = op_time.timestamp;
        stats.to_apply_document_count += 1;
        stats.to_apply_document_bytes += bytes;
    }

    if first && require_fresher_sync_source && documents.len() == 1 {
        return Err(FetchError::InvalidSyncSource {
            reason: format!("sync source returned nothing beyond ts {}", last_ts),
        });
    }

    stats.last_document = last_document;
    Ok(stats)
}

fn doc_bytes(doc: &Value) -> usize {
    serde_json::to_vec(doc).map(|v| v.len()).unwrap_or(0)
}
