//! Reservation lifecycle as document patches.
//!
//! Each operation inspects a snapshot of the document and returns the patch
//! that moves it forward. Nothing here touches the store; callers submit the
//! patch through [`crate::store::DocumentStore::merge`].

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map, Value};

use crate::errors::AppError;
use crate::models::{
    clamp_unit, make_grid, Document, LogAction, LogEntry, Reservation, ReservationDraft,
    ReservationStatus, Tent, TentStatus,
};

/// Number of log entries kept in the document.
pub const MAX_LOG_ENTRIES: usize = 200;

/// Keys owned by the server when a hold is placed.
const SERVER_OWNED_KEYS: [&str; 2] = ["status", "tentId"];

/// Place a pending hold on an available tent.
pub fn hold(
    doc: &Document,
    tent_id: i64,
    draft: ReservationDraft,
    hold_minutes: i64,
    now: DateTime<Utc>,
) -> Result<(Value, Reservation), AppError> {
    if hold_minutes <= 0 {
        return Err(AppError::Validation(
            "holdMinutes must be positive".to_string(),
        ));
    }

    let tent = doc
        .tent(tent_id)
        .ok_or_else(|| AppError::NotFound(format!("Tent {} not found", tent_id)))?;
    if tent.status != TentStatus::Available {
        return Err(AppError::Conflict {
            message: format!("Tent {} is not available", tent_id),
            tent_id,
        });
    }

    let id = draft
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    if doc.reservation(&id).is_some() {
        return Err(AppError::Validation(format!(
            "Reservation {} already exists",
            id
        )));
    }

    let mut extra = draft.extra;
    for key in SERVER_OWNED_KEYS {
        extra.remove(key);
    }

    let created_at = draft.created_at.unwrap_or(now);
    let reservation = Reservation {
        id,
        tent_id,
        status: ReservationStatus::Pending,
        created_at,
        expires_at: Some(
            draft
                .expires_at
                .unwrap_or(now + Duration::minutes(hold_minutes)),
        ),
        customer: draft.customer,
        cart: draft.cart,
        extra,
    };

    let tents = with_tent_status(&doc.tents, tent_id, TentStatus::InProcess);
    let mut reservations = Vec::with_capacity(doc.reservations.len() + 1);
    reservations.push(reservation.clone());
    reservations.extend(doc.reservations.iter().cloned());

    let log = LogEntry::new(LogAction::Hold, now)
        .tent(tent_id)
        .reservation(&reservation.id);
    let patch = build_patch(doc, Some(tents), Some(reservations), vec![log])?;
    Ok((patch, reservation))
}

/// Move a reservation to `new_status` and its tent to `to_state`.
pub fn release(
    doc: &Document,
    tent_id: i64,
    reservation_id: &str,
    to_state: TentStatus,
    new_status: ReservationStatus,
    now: DateTime<Utc>,
) -> Result<Value, AppError> {
    let reservation = doc.reservation(reservation_id).ok_or_else(|| {
        AppError::NotFound(format!("Reservation {} not found", reservation_id))
    })?;
    check_tent(reservation, tent_id)?;

    let tents = with_tent_status(&doc.tents, tent_id, to_state);
    let reservations = with_reservation_status(&doc.reservations, reservation_id, new_status);
    let log = LogEntry::new(LogAction::Release, now)
        .tent(tent_id)
        .reservation(reservation_id);
    build_patch(doc, Some(tents), Some(reservations), vec![log])
}

/// Mark a reservation paid and its tent occupied.
pub fn confirm_paid(
    doc: &Document,
    tent_id: i64,
    reservation_id: &str,
    now: DateTime<Utc>,
) -> Result<Value, AppError> {
    let reservation = doc.reservation(reservation_id).ok_or_else(|| {
        AppError::NotFound(format!("Reservation {} not found", reservation_id))
    })?;
    check_tent(reservation, tent_id)?;
    if matches!(
        reservation.status,
        ReservationStatus::Expired | ReservationStatus::Cancelled
    ) {
        return Err(AppError::Conflict {
            message: format!(
                "Reservation {} is no longer active",
                reservation_id
            ),
            tent_id,
        });
    }

    let tents = with_tent_status(&doc.tents, tent_id, TentStatus::Occupied);
    let reservations =
        with_reservation_status(&doc.reservations, reservation_id, ReservationStatus::Paid);
    let log = LogEntry::new(LogAction::Confirm, now)
        .tent(tent_id)
        .reservation(reservation_id);
    build_patch(doc, Some(tents), Some(reservations), vec![log])
}

/// Cancel a reservation and free its tent unless the tent is blocked.
pub fn cancel(doc: &Document, reservation_id: &str, now: DateTime<Utc>) -> Result<Value, AppError> {
    let reservation = doc.reservation(reservation_id).ok_or_else(|| {
        AppError::NotFound(format!("Reservation {} not found", reservation_id))
    })?;
    let tent_id = reservation.tent_id;

    let tents: Vec<Tent> = doc
        .tents
        .iter()
        .map(|t| {
            let mut t = t.clone();
            if t.id == tent_id && t.status != TentStatus::Blocked {
                t.status = TentStatus::Available;
            }
            t
        })
        .collect();
    let reservations = with_reservation_status(
        &doc.reservations,
        reservation_id,
        ReservationStatus::Cancelled,
    );
    let log = LogEntry::new(LogAction::Cancel, now)
        .tent(tent_id)
        .reservation(reservation_id);
    build_patch(doc, Some(tents), Some(reservations), vec![log])
}

/// Expire every pending reservation whose deadline has passed at `now`.
///
/// Returns the patch and the number of expired reservations, or `None` when
/// nothing is due.
pub fn expire_pending(doc: &Document, now: DateTime<Utc>) -> Result<Option<(Value, usize)>, AppError> {
    let expired: Vec<&Reservation> = doc
        .reservations
        .iter()
        .filter(|r| r.is_expired_at(now))
        .collect();
    if expired.is_empty() {
        return Ok(None);
    }

    let tents: Vec<Tent> = doc
        .tents
        .iter()
        .map(|t| {
            let mut t = t.clone();
            if expired.iter().any(|r| r.tent_id == t.id) {
                t.status = TentStatus::Available;
            }
            t
        })
        .collect();
    let reservations: Vec<Reservation> = doc
        .reservations
        .iter()
        .map(|r| {
            let mut r = r.clone();
            if r.is_expired_at(now) {
                r.status = ReservationStatus::Expired;
            }
            r
        })
        .collect();
    let logs = expired
        .iter()
        .map(|r| {
            LogEntry::new(LogAction::Expire, now)
                .tent(r.tent_id)
                .reservation(&r.id)
        })
        .collect();

    let count = expired.len();
    let patch = build_patch(doc, Some(tents), Some(reservations), logs)?;
    Ok(Some((patch, count)))
}

/// Requested change to a single tent.
#[derive(Debug, Clone, Default)]
pub struct TentUpdate {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub status: Option<TentStatus>,
}

/// Move or restate a tent, creating it when the id is new.
pub fn update_tent(
    doc: &Document,
    id: i64,
    update: &TentUpdate,
    now: DateTime<Utc>,
) -> Result<(Value, Tent), AppError> {
    let x = update.x.map(checked_coordinate).transpose()?;
    let y = update.y.map(checked_coordinate).transpose()?;

    let mut tents = doc.tents.clone();
    let index = match tents.iter().position(|t| t.id == id) {
        Some(index) => index,
        None => {
            tents.push(Tent::new(id, 0.5, 0.5));
            tents.len() - 1
        }
    };
    let tent = &mut tents[index];
    if let Some(x) = x {
        tent.x = x;
    }
    if let Some(y) = y {
        tent.y = y;
    }
    if let Some(status) = update.status {
        tent.status = status;
    }
    let updated = tent.clone();

    let log = LogEntry::new(LogAction::TentUpdate, now).tent(id);
    let patch = build_patch(doc, Some(tents), None, vec![log])?;
    Ok((patch, updated))
}

/// Replace the whole tent list, clamping coordinates into the map.
pub fn sync_tents(doc: &Document, tents: Vec<Tent>, now: DateTime<Utc>) -> Result<Value, AppError> {
    let mut seen = std::collections::HashSet::new();
    let mut checked = Vec::with_capacity(tents.len());
    for mut tent in tents {
        if !seen.insert(tent.id) {
            return Err(AppError::Validation(format!("Duplicate tent id {}", tent.id)));
        }
        tent.x = checked_coordinate(tent.x)?;
        tent.y = checked_coordinate(tent.y)?;
        checked.push(tent);
    }

    let log = LogEntry::new(LogAction::TentSync, now);
    build_patch(doc, Some(checked), None, vec![log])
}

/// Resize the layout and lay the tents out again on a fresh grid.
pub fn regrid(doc: &Document, count: usize, now: DateTime<Utc>) -> Result<Value, AppError> {
    if count == 0 {
        return Err(AppError::Validation("count must be at least 1".to_string()));
    }

    let log = LogEntry::new(LogAction::Regrid, now);
    let mut patch = build_patch(doc, Some(make_grid(count)), None, vec![log])?;
    if let Value::Object(map) = &mut patch {
        map.insert("layout".to_string(), json!({ "count": count }));
    }
    Ok(patch)
}

fn check_tent(reservation: &Reservation, tent_id: i64) -> Result<(), AppError> {
    if reservation.tent_id != tent_id {
        return Err(AppError::Validation(format!(
            "Reservation {} belongs to tent {}, not {}",
            reservation.id, reservation.tent_id, tent_id
        )));
    }
    Ok(())
}

fn checked_coordinate(value: f64) -> Result<f64, AppError> {
    clamp_unit(value)
        .ok_or_else(|| AppError::Validation("Tent coordinates must be finite numbers".to_string()))
}

fn with_tent_status(tents: &[Tent], id: i64, status: TentStatus) -> Vec<Tent> {
    tents
        .iter()
        .map(|t| {
            let mut t = t.clone();
            if t.id == id {
                t.status = status;
            }
            t
        })
        .collect()
}

fn with_reservation_status(
    reservations: &[Reservation],
    id: &str,
    status: ReservationStatus,
) -> Vec<Reservation> {
    reservations
        .iter()
        .map(|r| {
            let mut r = r.clone();
            if r.id == id {
                r.status = status;
            }
            r
        })
        .collect()
}

fn build_patch(
    doc: &Document,
    tents: Option<Vec<Tent>>,
    reservations: Option<Vec<Reservation>>,
    new_logs: Vec<LogEntry>,
) -> Result<Value, AppError> {
    let mut patch = Map::new();
    if let Some(tents) = tents {
        patch.insert("tents".to_string(), serde_json::to_value(tents)?);
    }
    if let Some(reservations) = reservations {
        patch.insert("reservations".to_string(), serde_json::to_value(reservations)?);
    }
    if !new_logs.is_empty() {
        let mut logs = doc.logs.clone();
        logs.extend(new_logs);
        if logs.len() > MAX_LOG_ENTRIES {
            logs.drain(..logs.len() - MAX_LOG_ENTRIES);
        }
        patch.insert("logs".to_string(), serde_json::to_value(logs)?);
    }
    Ok(Value::Object(patch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Customer;

    fn doc_with_tents(count: usize) -> Document {
        Document::seed(count)
    }

    fn apply(doc: &Document, patch: &Value) -> Document {
        let current = serde_json::to_value(doc).unwrap();
        let merged = crate::merge::merge_document(&current, patch, &Default::default());
        Document::from_value(&merged).unwrap()
    }

    fn draft(id: &str) -> ReservationDraft {
        ReservationDraft {
            id: Some(id.to_string()),
            customer: Some(Customer {
                name: "Ana".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_hold_marks_tent_in_process() {
        let doc = doc_with_tents(4);
        let now = Utc::now();
        let (patch, reservation) = hold(&doc, 2, draft("r1"), 15, now).unwrap();

        assert_eq!(reservation.status, ReservationStatus::Pending);
        assert_eq!(reservation.created_at, now);
        assert_eq!(reservation.expires_at, Some(now + Duration::minutes(15)));

        let next = apply(&doc, &patch);
        assert_eq!(next.tent(2).unwrap().status, TentStatus::InProcess);
        assert_eq!(next.tent(1).unwrap().status, TentStatus::Available);
        assert_eq!(next.reservations[0].id, "r1");
        assert_eq!(next.logs.last().unwrap().action, LogAction::Hold);
    }

    #[test]
    fn test_hold_rejects_unavailable_and_unknown_tents() {
        let doc = doc_with_tents(3);
        let now = Utc::now();
        let (patch, _) = hold(&doc, 1, draft("r1"), 15, now).unwrap();
        let next = apply(&doc, &patch);

        assert!(matches!(
            hold(&next, 1, draft("r2"), 15, now),
            Err(AppError::Conflict { tent_id: 1, .. })
        ));
        assert!(matches!(
            hold(&next, 99, draft("r3"), 15, now),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            hold(&next, 2, draft("r1"), 15, now),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            hold(&next, 2, draft("r4"), 0, now),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_hold_ignores_client_status() {
        let doc = doc_with_tents(2);
        let mut d = draft("r1");
        d.extra.insert("status".to_string(), json!("paid"));
        d.extra.insert("note".to_string(), json!("sunset"));

        let (patch, reservation) = hold(&doc, 1, d, 15, Utc::now()).unwrap();
        assert_eq!(reservation.status, ReservationStatus::Pending);
        assert_eq!(patch["reservations"][0]["status"], json!("pending"));
        assert_eq!(patch["reservations"][0]["note"], json!("sunset"));
    }

    #[test]
    fn test_expire_pending_frees_tents() {
        let doc = doc_with_tents(3);
        let then = Utc::now() - Duration::minutes(30);
        let (patch, _) = hold(&doc, 1, draft("old"), 15, then).unwrap();
        let doc = apply(&doc, &patch);
        let (patch, _) = hold(&doc, 2, draft("fresh"), 15, Utc::now()).unwrap();
        let doc = apply(&doc, &patch);

        let (patch, count) = expire_pending(&doc, Utc::now()).unwrap().unwrap();
        assert_eq!(count, 1);

        let next = apply(&doc, &patch);
        assert_eq!(next.tent(1).unwrap().status, TentStatus::Available);
        assert_eq!(next.tent(2).unwrap().status, TentStatus::InProcess);
        assert_eq!(next.reservation("old").unwrap().status, ReservationStatus::Expired);
        assert_eq!(next.reservation("fresh").unwrap().status, ReservationStatus::Pending);

        assert!(expire_pending(&next, Utc::now()).unwrap().is_none());
    }

    #[test]
    fn test_confirm_and_release() {
        let doc = doc_with_tents(2);
        let now = Utc::now();
        let (patch, _) = hold(&doc, 1, draft("r1"), 15, now).unwrap();
        let doc = apply(&doc, &patch);

        let paid = apply(&doc, &confirm_paid(&doc, 1, "r1", now).unwrap());
        assert_eq!(paid.tent(1).unwrap().status, TentStatus::Occupied);
        assert_eq!(paid.reservation("r1").unwrap().status, ReservationStatus::Paid);

        let released = apply(
            &paid,
            &release(&paid, 1, "r1", TentStatus::Available, ReservationStatus::Expired, now).unwrap(),
        );
        assert_eq!(released.tent(1).unwrap().status, TentStatus::Available);
        assert_eq!(released.reservation("r1").unwrap().status, ReservationStatus::Expired);

        assert!(matches!(
            confirm_paid(&released, 1, "r1", now),
            Err(AppError::Conflict { .. })
        ));
        assert!(matches!(
            release(&released, 1, "missing", TentStatus::Available, ReservationStatus::Expired, now),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_tent_must_match_reservation() {
        let doc = doc_with_tents(3);
        let now = Utc::now();
        let (patch, _) = hold(&doc, 1, draft("r1"), 15, now).unwrap();
        let doc = apply(&doc, &patch);

        assert!(matches!(
            confirm_paid(&doc, 2, "r1", now),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            release(&doc, 3, "r1", TentStatus::Available, ReservationStatus::Expired, now),
            Err(AppError::Validation(_))
        ));
        assert_eq!(doc.tent(2).unwrap().status, TentStatus::Available);
    }

    #[test]
    fn test_cancel_keeps_blocked_tents_blocked() {
        let doc = doc_with_tents(2);
        let now = Utc::now();
        let (patch, _) = hold(&doc, 2, draft("r1"), 15, now).unwrap();
        let doc = apply(&doc, &patch);

        let cancelled = apply(&doc, &cancel(&doc, "r1", now).unwrap());
        assert_eq!(cancelled.tent(2).unwrap().status, TentStatus::Available);
        assert_eq!(
            cancelled.reservation("r1").unwrap().status,
            ReservationStatus::Cancelled
        );

        let update = TentUpdate {
            status: Some(TentStatus::Blocked),
            ..Default::default()
        };
        let (patch, _) = update_tent(&doc, 2, &update, now).unwrap();
        let blocked = apply(&doc, &patch);
        let after = apply(&blocked, &cancel(&blocked, "r1", now).unwrap());
        assert_eq!(after.tent(2).unwrap().status, TentStatus::Blocked);
    }

    #[test]
    fn test_update_tent_upserts_and_clamps() {
        let doc = doc_with_tents(2);
        let now = Utc::now();

        let update = TentUpdate {
            x: Some(1.7),
            y: Some(-0.3),
            status: None,
        };
        let (patch, tent) = update_tent(&doc, 1, &update, now).unwrap();
        assert_eq!((tent.x, tent.y), (1.0, 0.0));
        assert_eq!(apply(&doc, &patch).tents.len(), 2);

        let (patch, tent) = update_tent(&doc, 7, &TentUpdate::default(), now).unwrap();
        assert_eq!((tent.x, tent.y, tent.status), (0.5, 0.5, TentStatus::Available));
        assert_eq!(apply(&doc, &patch).tents.len(), 3);

        let bad = TentUpdate {
            x: Some(f64::INFINITY),
            ..Default::default()
        };
        assert!(matches!(
            update_tent(&doc, 1, &bad, now),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_sync_tents_rejects_duplicates() {
        let doc = doc_with_tents(1);
        let tents = vec![Tent::new(1, 0.2, 0.2), Tent::new(1, 0.3, 0.3)];
        assert!(matches!(
            sync_tents(&doc, tents, Utc::now()),
            Err(AppError::Validation(_))
        ));

        let patch = sync_tents(&doc, vec![Tent::new(5, 2.0, 0.4)], Utc::now()).unwrap();
        assert_eq!(patch["tents"], json!([{ "id": 5, "x": 1.0, "y": 0.4, "state": "av" }]));
    }

    #[test]
    fn test_regrid() {
        let doc = doc_with_tents(20);
        let next = apply(&doc, &regrid(&doc, 6, Utc::now()).unwrap());
        assert_eq!(next.tents.len(), 6);
        assert_eq!(next.layout.count, 6);
        assert!(regrid(&doc, 0, Utc::now()).is_err());
    }

    #[test]
    fn test_log_is_capped() {
        let mut doc = doc_with_tents(1);
        doc.logs = (0..MAX_LOG_ENTRIES)
            .map(|_| LogEntry::new(LogAction::TentSync, Utc::now()))
            .collect();
        let first_kept = doc.logs[1].id.clone();

        let patch = regrid(&doc, 2, Utc::now()).unwrap();
        let next = apply(&doc, &patch);
        assert_eq!(next.logs.len(), MAX_LOG_ENTRIES);
        assert_eq!(next.logs[0].id, first_kept);
        assert_eq!(next.logs.last().unwrap().action, LogAction::Regrid);
    }
}
