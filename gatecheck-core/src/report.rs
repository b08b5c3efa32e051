//! Sales report reconciliation
//!
//! The CSV export is the service's authoritative record of sales. Rows are
//! checked field-by-field against reservations the ledger knew before the
//! request went out, and the row count must stay inside the window allowed
//! by in-flight reservations.

use crate::ledger::Ledger;
use crate::model::Reservation;
use chrono::{DateTime, Utc};
use gatecheck_http::{fatal, CheckFunc, CheckResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// The exact header the export must carry, in order
const REPORT_HEADER: [&str; 8] = [
    "reservation_id",
    "event_id",
    "rank",
    "num",
    "price",
    "user_id",
    "sold_at",
    "canceled_at",
];

/// One parsed report row; used only for comparison, never persisted
#[derive(Debug)]
pub struct ReportRecord {
    pub reservation_id: u64,
    pub event_id: u64,
    pub sheet_rank: String,
    pub sheet_num: u64,
    pub user_id: u64,
    pub canceled_at: Option<DateTime<Utc>>,
}

/// Verifier for the full sales report
///
/// `before` must be the reservations settled before the request went out,
/// and `time_before` the matching cutoff.
pub fn check_report(
    ledger: Arc<Ledger>,
    time_before: DateTime<Utc>,
    before: HashMap<u64, Arc<Reservation>>,
) -> CheckFunc<'static> {
    Box::new(move |res| {
        let after_count = ledger.reservations_snapshot().len();
        let maybe_after = ledger.maybe_reserved_count();
        verify_report_body(
            &ledger,
            &res.body,
            time_before,
            &before,
            None,
            after_count,
            maybe_after,
        )
    })
}

/// Verifier for the per-event sales report
pub fn check_event_report(
    ledger: Arc<Ledger>,
    event_id: u64,
    time_before: DateTime<Utc>,
    before: HashMap<u64, Arc<Reservation>>,
) -> CheckFunc<'static> {
    Box::new(move |res| {
        let after_count = ledger.reservations_snapshot_for_event(event_id).len();
        let maybe_after = ledger.maybe_reserved_count_for_event(event_id);
        verify_report_body(
            &ledger,
            &res.body,
            time_before,
            &before,
            Some(event_id),
            after_count,
            maybe_after,
        )
    })
}

fn verify_report_body(
    ledger: &Ledger,
    body: &[u8],
    time_before: DateTime<Utc>,
    before: &HashMap<u64, Arc<Reservation>>,
    scope_event: Option<u64>,
    after_count: usize,
    maybe_after: usize,
) -> CheckResult<()> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(body);
    let mut records = reader.records();

    let header = records
        .next()
        .ok_or_else(|| fatal!("sales report is empty"))?
        .map_err(|e| fatal!("failed to parse the sales report CSV: {}", e))?;
    check_report_header(&header)?;

    let mut row_count = 0usize;
    for record in records {
        let record = record.map_err(|e| fatal!("failed to parse the sales report CSV: {}", e))?;
        let parsed = parse_report_record(ledger, &record, row_count)?;

        if let Some(event_id) = scope_event {
            if parsed.event_id != event_id {
                return Err(fatal!(
                    "sales report line {}: row for event {} in the report for event {}",
                    row_count,
                    parsed.event_id,
                    event_id
                ));
            }
        }

        if let Some(known) = before.get(&parsed.reservation_id) {
            check_record_against_known(&parsed, known, time_before, row_count)?;
        }
        row_count += 1;
    }

    check_report_count(before.len(), row_count, after_count, maybe_after)
}

fn check_report_header(record: &csv::StringRecord) -> CheckResult<()> {
    if record.len() != REPORT_HEADER.len()
        || REPORT_HEADER
            .iter()
            .enumerate()
            .any(|(i, name)| record.get(i) != Some(*name))
    {
        return Err(fatal!("sales report header is wrong"));
    }
    Ok(())
}

fn parse_report_record(
    ledger: &Ledger,
    record: &csv::StringRecord,
    line: usize,
) -> CheckResult<ReportRecord> {
    if record.len() != REPORT_HEADER.len() {
        return Err(fatal!(
            "sales report line {}: expected {} fields, got {}",
            line,
            REPORT_HEADER.len(),
            record.len()
        ));
    }

    let reservation_id = parse_number(record, 0, "reservation_id", line)?;
    let event_id = parse_number(record, 1, "event_id", line)?;
    let sheet_rank = record.get(2).unwrap_or("").to_string();
    let sheet_num = parse_number(record, 3, "num", line)?;
    let price = parse_number(record, 4, "price", line)?;
    let user_id = parse_number(record, 5, "user_id", line)?;

    let sold_at = record.get(6).unwrap_or("");
    DateTime::parse_from_rfc3339(sold_at)
        .map_err(|_| fatal!("sales report line {}: invalid sold_at {:?}", line, sold_at))?;

    let canceled_at = match record.get(7).unwrap_or("") {
        "" => None,
        value => Some(
            DateTime::parse_from_rfc3339(value)
                .map_err(|_| fatal!("sales report line {}: invalid canceled_at {:?}", line, value))?
                .with_timezone(&Utc),
        ),
    };

    let event = ledger
        .find_event_by_id(event_id)
        .ok_or_else(|| fatal!("sales report line {}: unknown event {}", line, event_id))?;
    let kind = ledger
        .sheet_kind_by_rank(&sheet_rank)
        .ok_or_else(|| fatal!("sales report line {}: unknown rank {:?}", line, sheet_rank))?;

    let expected_price = event.snapshot().price + kind.price;
    if price != expected_price {
        return Err(fatal!(
            "sales report line {}: price {} does not match expected {}",
            line,
            price,
            expected_price
        ));
    }

    Ok(ReportRecord {
        reservation_id,
        event_id,
        sheet_rank,
        sheet_num,
        user_id,
        canceled_at,
    })
}

fn parse_number(
    record: &csv::StringRecord,
    index: usize,
    name: &str,
    line: usize,
) -> CheckResult<u64> {
    record
        .get(index)
        .unwrap_or("")
        .parse()
        .map_err(|_| fatal!("sales report line {}: invalid {}", line, name))
}

/// Rows matching a reservation known before the request must match exactly;
/// a cancellation that definitely settled before the window must carry its
/// timestamp, one that merely overlapped the window is a tolerated race.
fn check_record_against_known(
    record: &ReportRecord,
    known: &Reservation,
    time_before: DateTime<Utc>,
    line: usize,
) -> CheckResult<()> {
    if known.event_id != record.event_id
        || known.user_id != record.user_id
        || known.sheet_rank != record.sheet_rank
        || known.sheet_num != record.sheet_num
    {
        return Err(fatal!(
            "sales report line {}: row for reservation {} does not match the ledger",
            line,
            record.reservation_id
        ));
    }

    if known.canceled_before(time_before) {
        if record.canceled_at.is_none() {
            return Err(fatal!(
                "sales report line {}: reservation {} was canceled but the row has no canceled_at",
                line,
                record.reservation_id
            ));
        }
    } else if known.maybe_canceled(time_before) && record.canceled_at.is_none() {
        warn!(
            "sales report line {}: cancellation of reservation {} overlapped the request, missing canceled_at tolerated",
            line, record.reservation_id
        );
    }

    Ok(())
}

fn check_report_count(
    before_count: usize,
    report_count: usize,
    after_count: usize,
    maybe_after: usize,
) -> CheckResult<()> {
    tracing::debug!(
        "report count window: {} <= {} <= {} + {}",
        before_count,
        report_count,
        after_count,
        maybe_after
    );
    if before_count <= report_count && report_count <= after_count + maybe_after {
        return Ok(());
    }
    Err(fatal!(
        "sales report has {} rows, expected between {} and {}",
        report_count,
        before_count,
        after_count + maybe_after
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::model::PendingReservation;
    use gatecheck_http::{Bytes, HeaderMap, PlayedResponse, StatusCode};
    use std::time::Duration;

    const HEADER: &str = "reservation_id,event_id,rank,num,price,user_id,sold_at,canceled_at";

    fn ledger() -> Arc<Ledger> {
        Arc::new(Ledger::new(&Dataset::sample(), Duration::from_secs(1)))
    }

    fn played(body: &str) -> PlayedResponse {
        PlayedResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn commit(ledger: &Ledger, id: u64, rank: &str, num: u64) -> Arc<Reservation> {
        let reservation = Arc::new(Reservation::new(id, 1, 1, rank.to_string(), num));
        ledger.commit_reservation(reservation.clone()).unwrap();
        reservation
    }

    #[test]
    fn test_settled_report_reconciliation_is_idempotent() {
        let ledger = ledger();
        commit(&ledger, 1, "S", 7);
        commit(&ledger, 2, "B", 40);

        // Event 1 price 1000; S price 5000, B price 1000
        let body = format!(
            "{}\n1,1,S,7,6000,1,2026-08-07T10:00:00Z,\n2,1,B,40,2000,1,2026-08-07T10:00:01Z,\n",
            HEADER
        );

        let time_before = Utc::now();
        let before = ledger.reservations_settled_before(time_before);
        assert_eq!(before.len(), 2);

        for _ in 0..2 {
            let check = check_report(ledger.clone(), time_before, before.clone());
            assert!(check(&played(&body)).is_ok());
        }
    }

    #[test]
    fn test_header_mismatch_is_fatal() {
        let ledger = ledger();
        let body = "reservation_id,event_id,rank,num,price,user_id,sold_at\n";
        let check = check_report(ledger, Utc::now(), HashMap::new());
        assert!(check(&played(body)).is_err());
    }

    #[test]
    fn test_price_mismatch_is_fatal() {
        let ledger = ledger();
        commit(&ledger, 1, "S", 7);
        // S on event 1 costs 6000, not 1234
        let body = format!("{}\n1,1,S,7,1234,1,2026-08-07T10:00:00Z,\n", HEADER);
        let time_before = Utc::now();
        let before = ledger.reservations_settled_before(time_before);
        let check = check_report(ledger.clone(), time_before, before);
        assert!(check(&played(&body)).is_err());
    }

    #[test]
    fn test_unknown_event_is_fatal() {
        let ledger = ledger();
        let body = format!("{}\n1,99,S,7,6000,1,2026-08-07T10:00:00Z,\n", HEADER);
        let check = check_report(ledger, Utc::now(), HashMap::new());
        assert!(check(&played(&body)).is_err());
    }

    #[test]
    fn test_malformed_timestamp_is_fatal() {
        let ledger = ledger();
        commit(&ledger, 1, "S", 7);
        let body = format!("{}\n1,1,S,7,6000,1,yesterday,\n", HEADER);
        let time_before = Utc::now();
        let before = ledger.reservations_settled_before(time_before);
        let check = check_report(ledger.clone(), time_before, before);
        assert!(check(&played(&body)).is_err());
    }

    #[test]
    fn test_missing_known_reservation_violates_count_window() {
        let ledger = ledger();
        commit(&ledger, 1, "S", 7);
        let body = format!("{}\n", HEADER);
        let time_before = Utc::now();
        let before = ledger.reservations_settled_before(time_before);
        let check = check_report(ledger.clone(), time_before, before);
        assert!(check(&played(&body)).is_err());
    }

    #[test]
    fn test_pending_reserve_log_grants_count_slack() {
        let ledger = ledger();
        // A reservation is in flight: not committed, but logged
        ledger.append_reserve_log(PendingReservation {
            event_id: 1,
            user_id: 1,
            sheet_rank: "S".to_string(),
        });

        // The service already counts it: one extra row is tolerated
        let body = format!("{}\n5,1,S,7,6000,1,2026-08-07T10:00:00Z,\n", HEADER);
        let check = check_report(ledger.clone(), Utc::now(), HashMap::new());
        assert!(check(&played(&body)).is_ok());
    }

    #[test]
    fn test_definite_cancellation_requires_timestamp() {
        let ledger = ledger();
        let reservation = commit(&ledger, 1, "S", 7);
        let stored = ledger.begin_cancel_reservation(1).unwrap();
        ledger.commit_cancel_reservation(&stored);
        drop(reservation);

        let time_before = Utc::now();
        let before = ledger.reservations_settled_before(time_before);

        // Row without canceled_at although the cancellation settled
        let body = format!("{}\n1,1,S,7,6000,1,2026-08-07T10:00:00Z,\n", HEADER);
        let check = check_report(ledger.clone(), time_before, before.clone());
        assert!(check(&played(&body)).is_err());

        // With the timestamp present the row reconciles
        let body = format!(
            "{}\n1,1,S,7,6000,1,2026-08-07T10:00:00Z,2026-08-07T10:00:05Z\n",
            HEADER
        );
        let check = check_report(ledger.clone(), time_before, before);
        assert!(check(&played(&body)).is_ok());
    }

    #[test]
    fn test_in_flight_cancellation_tolerates_missing_timestamp() {
        let ledger = ledger();
        commit(&ledger, 1, "S", 7);
        // Cancel requested but not yet committed: ambiguous window
        let _stored = ledger.begin_cancel_reservation(1).unwrap();

        let time_before = Utc::now();
        let before = ledger.reservations_settled_before(time_before);

        let body = format!("{}\n1,1,S,7,6000,1,2026-08-07T10:00:00Z,\n", HEADER);
        let check = check_report(ledger.clone(), time_before, before);
        assert!(check(&played(&body)).is_ok());
    }

    #[test]
    fn test_event_report_rejects_foreign_rows() {
        let ledger = ledger();
        // A valid row, but for event 1 inside the report for event 2
        let body = format!("{}\n1,1,S,7,6000,1,2026-08-07T10:00:00Z,\n", HEADER);
        let check = check_event_report(ledger, 2, Utc::now(), HashMap::new());
        assert!(check(&played(&body)).is_err());
    }

    #[test]
    fn test_field_mismatch_against_known_reservation_is_fatal() {
        let ledger = ledger();
        commit(&ledger, 1, "S", 7);
        let time_before = Utc::now();
        let before = ledger.reservations_settled_before(time_before);

        // Seat number differs from the ledger
        let body = format!("{}\n1,1,S,8,6000,1,2026-08-07T10:00:00Z,\n", HEADER);
        let check = check_report(ledger.clone(), time_before, before);
        assert!(check(&played(&body)).is_err());
    }
}
