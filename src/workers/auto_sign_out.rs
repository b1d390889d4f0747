//! Auto sign-out reconciliation.
//!
//! Pages through open attendance sessions in each collection, force-closes
//! any session older than the configured threshold, backfills the
//! `last_sign_out` marker on unclassified records, and mirrors every close
//! into the per-user history log plus a best-effort notification email.
//!
//! Ordering invariant: side effects for a batch run strictly after that
//! batch's commit. A crash can therefore lose a history close or an email,
//! but can never announce a sign-out that was not durably written.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::AutoSignOutConfig;
use crate::constants::{MILLIS_PER_HOUR, SIGN_OUT_TAG_AUTO};
use crate::services::email::{EmailMessage, Mailer};
use crate::store::operations::attendance::{SessionCollection, SessionDoc, SessionRecord, WriteBatch};
use crate::store::operations::history::HistorySync;
use crate::store::timestamp;
use crate::store::{Store, StoreError};

#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub scanned: u64,
    pub closed: u64,
    pub backfilled: u64,
    pub commits: u64,
    pub history_closed: u64,
    pub history_failures: u64,
    pub emails_sent: u64,
    pub email_failures: u64,
}

/// Per-record decision. Evaluated independently per record against the
/// page's captured reference instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Noop,
    BackfillLastSignOut,
    ForceClose,
}

fn classify(record: &SessionRecord, now_ms: i64, threshold_ms: i64) -> Action {
    // A closed session is never rewritten, whatever else the record holds.
    if !record.is_open() {
        return Action::Noop;
    }

    let backfill_or_noop = if record.has_last_sign_out() {
        Action::Noop
    } else {
        Action::BackfillLastSignOut
    };

    match record.time_in().and_then(timestamp::normalize_epoch_millis) {
        // Unknown session start: staleness cannot be determined, only
        // schema-normalize the record.
        None => backfill_or_noop,
        Some(time_in_ms) => {
            if now_ms.saturating_sub(time_in_ms) >= threshold_ms {
                Action::ForceClose
            } else {
                backfill_or_noop
            }
        }
    }
}

struct HistoryJob {
    owner_id: String,
    now_ms: i64,
}

/// Side effects staged for the current batch. Drained only after the batch
/// commits; dropped with the batch if the commit fails.
#[derive(Default)]
struct SideEffectQueue {
    history: Vec<HistoryJob>,
    emails: Vec<EmailMessage>,
}

/// Commit the batch, then run its queued side effects: history syncs with
/// bounded concurrency, each failure isolated, then notifications
/// sequentially, each independently fault-tolerant. Serves both the mid-page
/// and the page-end flush.
async fn flush_batch<M: Mailer, H: HistorySync>(
    store: &Store,
    history: &H,
    mailer: &M,
    collection: SessionCollection,
    batch: WriteBatch,
    queue: &mut SideEffectQueue,
    concurrency: usize,
    stats: &mut RunStats,
) -> Result<(), StoreError> {
    if batch.is_empty() {
        return Ok(());
    }

    let ops = store.commit_session_batch(collection, batch)?;
    stats.commits += 1;
    tracing::debug!(collection = collection.name(), ops, "Committed write batch");

    let results = stream::iter(queue.history.drain(..))
        .map(|job| async move {
            let result = history.close_matching_open_entry(collection, &job.owner_id, job.now_ms);
            (job.owner_id, result)
        })
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    for (owner_id, result) in results {
        match result {
            Ok(true) => stats.history_closed += 1,
            Ok(false) => {}
            Err(e) => {
                stats.history_failures += 1;
                tracing::warn!(
                    collection = collection.name(),
                    owner_id = %owner_id,
                    error = %e,
                    "History sync failed"
                );
            }
        }
    }

    for message in queue.emails.drain(..) {
        match mailer.send(&message).await {
            Ok(()) => stats.emails_sent += 1,
            Err(e) => {
                stats.email_failures += 1;
                tracing::warn!(to = %message.to, error = %e, "Sign-out notification failed");
            }
        }
    }

    Ok(())
}

fn sign_out_notice(to: &str, collection: SessionCollection, now: DateTime<Utc>) -> EmailMessage {
    let role = match collection {
        SessionCollection::Students => "student",
        SessionCollection::Tutors => "tutor",
    };
    EmailMessage {
        to: to.to_string(),
        subject: "You were automatically signed out".to_string(),
        text: format!(
            "Your open {role} attendance session was closed automatically at {} \
             because it had been open for too long. If you already left, no \
             action is needed.",
            now.to_rfc3339()
        ),
    }
}

/// Reconcile one collection to completion. Only store read/commit errors
/// propagate; everything downstream of a successful commit is best-effort.
pub async fn reconcile_collection<M: Mailer>(
    store: &Store,
    mailer: &M,
    collection: SessionCollection,
    cfg: &AutoSignOutConfig,
) -> Result<RunStats, StoreError> {
    let threshold_ms = cfg.threshold_hours.saturating_mul(MILLIS_PER_HOUR);
    let mut stats = RunStats::default();
    let mut cursor: Option<String> = None;

    loop {
        let page = store.scan_open_sessions(collection, cfg.page_size, cursor.as_deref())?;
        if page.records.is_empty() {
            break;
        }

        // One reference instant per page: every record in the page is
        // classified against the same "now".
        let now = Utc::now();
        let now_ms = now.timestamp_millis();

        // The cursor is the last key seen across the whole page, not just
        // the last committed batch.
        let last_key = page.last_key().map(str::to_string);
        let has_more = page.has_more;

        let mut batch = WriteBatch::new(cfg.batch_limit);
        let mut queue = SideEffectQueue::default();

        for record in page.records {
            stats.scanned += 1;

            let full = match classify(&record, now_ms, threshold_ms) {
                Action::Noop => continue,
                Action::BackfillLastSignOut => {
                    stats.backfilled += 1;
                    batch.stage_merge(&record.key, &record.doc, &backfill_patch())?
                }
                Action::ForceClose => {
                    stats.closed += 1;
                    queue.history.push(HistoryJob {
                        owner_id: record.key.clone(),
                        now_ms,
                    });
                    if let Some(to) = record.email() {
                        queue.emails.push(sign_out_notice(to, collection, now));
                    }
                    batch.stage_merge(&record.key, &record.doc, &force_close_patch(now_ms))?
                }
            };

            if full {
                let staged = std::mem::replace(&mut batch, WriteBatch::new(cfg.batch_limit));
                flush_batch(
                    store,
                    store,
                    mailer,
                    collection,
                    staged,
                    &mut queue,
                    cfg.history_sync_concurrency,
                    &mut stats,
                )
                .await?;
            }
        }

        flush_batch(
            store,
            store,
            mailer,
            collection,
            batch,
            &mut queue,
            cfg.history_sync_concurrency,
            &mut stats,
        )
        .await?;

        cursor = last_key;
        if !has_more {
            break;
        }
    }

    Ok(stats)
}

fn backfill_patch() -> SessionDoc {
    let mut patch = SessionDoc::new();
    patch.insert("last_sign_out".to_string(), Value::Null);
    patch
}

fn force_close_patch(now_ms: i64) -> SessionDoc {
    let mut patch = SessionDoc::new();
    patch.insert("time_out".to_string(), json!(now_ms));
    patch.insert("last_sign_out".to_string(), json!(SIGN_OUT_TAG_AUTO));
    patch
}

/// Scheduled entry point: reconcile both collections, logging per-collection
/// outcomes. A store failure aborts only the affected collection's run; the
/// next scheduled run starts a fresh scan.
pub async fn run<M: Mailer>(store: &Store, mailer: &M, cfg: &AutoSignOutConfig) {
    tracing::debug!("auto_sign_out: start");
    for collection in SessionCollection::ALL {
        match reconcile_collection(store, mailer, collection, cfg).await {
            Ok(stats) => tracing::info!(
                collection = collection.name(),
                scanned = stats.scanned,
                closed = stats.closed,
                backfilled = stats.backfilled,
                commits = stats.commits,
                history_closed = stats.history_closed,
                emails_sent = stats.emails_sent,
                email_failures = stats.email_failures,
                "auto_sign_out: done"
            ),
            Err(e) => tracing::error!(
                collection = collection.name(),
                error = %e,
                "auto_sign_out failed"
            ),
        }
    }
}
