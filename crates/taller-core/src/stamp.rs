//! # Stamp Resolution Module
//!
//! Normalizes the heterogeneous timestamp representations the document store
//! produces into a single comparable instant.
//!
//! ## Why So Many Representations?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Timestamp Lifecycle                                  │
//! │                                                                         │
//! │  t0: client writes movement                                            │
//! │      └── stamp.pending_local = local clock (usable immediately)        │
//! │  t1: store acknowledges                                                │
//! │      └── stamp.server = {seconds, nanoseconds} (authoritative)         │
//! │  t2: Modified delta arrives                                            │
//! │      └── timeline silently reorders under the server stamp             │
//! │                                                                         │
//! │  Legacy documents carry epoch millis or date text instead; very old    │
//! │  ones carry nothing but a creation date or a reference number with     │
//! │  the date embedded.                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Resolution Order
//! 1. resolved server stamp (authoritative write time)
//! 2. raw `{seconds, nanoseconds}` pair (same data, unresolved envelope)
//! 3. epoch milliseconds
//! 4. parseable date text
//! 5. locally-cached pending instant recorded at insert time
//! 6. fallback creation date
//! 7. date embedded in the human-readable reference number
//! 8. epoch zero (sorts to the end of a descending timeline)
//!
//! Resolution is deterministic and side-effect-free.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// =============================================================================
// Server Stamp
// =============================================================================

/// A server-assigned write time as stored: seconds since the epoch plus
/// a nanosecond component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ServerStamp {
    pub seconds: i64,
    pub nanoseconds: u32,
}

impl ServerStamp {
    /// Creates a server stamp from an instant.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        ServerStamp {
            seconds: dt.timestamp(),
            nanoseconds: dt.timestamp_subsec_nanos(),
        }
    }

    /// Converts to an instant. Out-of-range pairs collapse to epoch zero
    /// rather than failing: resolution must be total.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.seconds, self.nanoseconds)
            .single()
            .unwrap_or_else(epoch)
    }
}

// =============================================================================
// Stamp Envelope
// =============================================================================

/// The timestamp envelope carried by every movement-like document.
///
/// At most one of `server`/`millis`/`text` is normally present, but the
/// resolver tolerates any combination and applies the documented order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Stamp {
    /// Authoritative server write time, present once the write round-trip
    /// has completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerStamp>,

    /// Legacy representation: epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub millis: Option<i64>,

    /// Legacy representation: date text (RFC 3339 or `YYYY-MM-DD [HH:MM:SS]`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Local clock recorded at insert time, before the server stamp
    /// resolves. Keeps the timeline usable during the round-trip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(as = "Option<String>")]
    pub pending_local: Option<DateTime<Utc>>,
}

impl Stamp {
    /// Envelope for a fresh local write: pending instant only, server stamp
    /// to be filled in by the store.
    pub fn pending(now: DateTime<Utc>) -> Self {
        Stamp {
            pending_local: Some(now),
            ..Stamp::default()
        }
    }

    /// Envelope with a resolved server stamp (tests, migrations).
    pub fn resolved(dt: DateTime<Utc>) -> Self {
        Stamp {
            server: Some(ServerStamp::from_datetime(dt)),
            ..Stamp::default()
        }
    }

    /// True once the authoritative server time is known.
    pub fn is_resolved(&self) -> bool {
        self.server.is_some()
    }
}

// =============================================================================
// Stamped Trait
// =============================================================================

/// A record whose position in a timeline can be resolved.
///
/// `created_at` and `reference` are the record-level fallbacks; most types
/// only override the ones they actually carry.
pub trait Stamped {
    fn stamp(&self) -> &Stamp;

    fn created_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn reference(&self) -> Option<&str> {
        None
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Epoch zero - the last-resort instant.
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Resolves a record to a single comparable instant (see module docs for
/// the order). Total: always produces an instant.
pub fn resolve_instant<T: Stamped + ?Sized>(record: &T) -> DateTime<Utc> {
    let stamp = record.stamp();

    // 1-2: server pair, resolved or raw
    if let Some(server) = &stamp.server {
        return server.to_datetime();
    }

    // 3: epoch millis
    if let Some(ms) = stamp.millis {
        if let Some(dt) = Utc.timestamp_millis_opt(ms).single() {
            return dt;
        }
    }

    // 4: date text
    if let Some(text) = &stamp.text {
        if let Some(dt) = parse_date_text(text) {
            return dt;
        }
    }

    // 5: pending local instant
    if let Some(pending) = stamp.pending_local {
        return pending;
    }

    // 6: creation date
    if let Some(created) = record.created_at() {
        return created;
    }

    // 7: date embedded in the reference number
    if let Some(reference) = record.reference() {
        if let Some(dt) = date_from_reference(reference) {
            return dt;
        }
    }

    // 8: epoch zero
    epoch()
}

/// Parses date text: RFC 3339, then `YYYY-MM-DD HH:MM:SS`, then bare
/// `YYYY-MM-DD` (midnight UTC).
fn parse_date_text(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }

    None
}

/// Extracts a date from a human-readable reference number.
///
/// Invoice numbers embed the day as an 8-digit run (`20260823-0001`),
/// so the first run of exactly 8 digits that parses as `YYYYMMDD` within a
/// plausible year range wins.
pub fn date_from_reference(reference: &str) -> Option<DateTime<Utc>> {
    for run in digit_runs(reference) {
        if run.len() != 8 {
            continue;
        }
        if let Ok(date) = NaiveDate::parse_from_str(run, "%Y%m%d") {
            let year = date.format("%Y").to_string().parse::<i32>().ok()?;
            if (2000..=2100).contains(&year) {
                return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
            }
        }
    }
    None
}

/// Iterator over maximal runs of ASCII digits in a string.
fn digit_runs(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c: char| !c.is_ascii_digit())
        .filter(|run| !run.is_empty())
}

// =============================================================================
// Unit Tests
// =============================================================================
