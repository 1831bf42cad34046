use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::event::OpenEvent;
use crate::useragent::DeviceClass;

/// Derived engagement view for one tracking id. Never persisted: computed
/// fresh from the event log on every read, and reproducible byte-for-byte
/// from the same log (ordered maps, no clock or RNG input).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSnapshot {
    pub opens: u64,
    pub last_opened: Option<DateTime<Utc>>,
    pub devices: BTreeMap<String, u64>,
    pub locations: BTreeMap<String, u64>,
    pub open_history: Vec<OpenRecord>,
}

/// One counted open, projected for display.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenRecord {
    pub opened_at: DateTime<Utc>,
    pub device: DeviceClass,
    pub browser: String,
    pub os: String,
    pub location: String,
    pub is_proxy: bool,
}

impl From<OpenEvent> for OpenRecord {
    fn from(event: OpenEvent) -> Self {
        OpenRecord {
            opened_at: event.observed_at,
            device: event.device,
            browser: event.browser,
            os: event.os,
            location: event.ip_address,
            is_proxy: event.is_proxy,
        }
    }
}

/// Fold the raw event log for one tracking id into an [`AnalyticsSnapshot`].
///
/// The earliest event is discarded unconditionally before counting: the
/// first pixel fetch is reliably the mail provider's prefetch/scan pass
/// rather than a human open, and counting it inflates open rates past
/// usefulness. The rule is applied uniformly regardless of the `is_proxy`
/// flag, which stays on each record as input for a smarter future policy.
/// A consequence worth keeping in mind: a log with exactly one event
/// aggregates to zero opens, since a single fetch is indistinguishable
/// from pure proxy noise.
pub fn aggregate(mut events: Vec<OpenEvent>) -> AnalyticsSnapshot {
    // Stable sort: events with equal timestamps keep their store order,
    // so reruns over an unchanged log always agree.
    events.sort_by_key(|e| e.observed_at);

    if events.len() < 2 {
        return AnalyticsSnapshot::default();
    }

    let valid = &events[1..];

    let mut devices: BTreeMap<String, u64> = BTreeMap::new();
    let mut locations: BTreeMap<String, u64> = BTreeMap::new();
    for event in valid {
        *devices.entry(event.device.as_str().to_string()).or_default() += 1;
        *locations.entry(event.ip_address.clone()).or_default() += 1;
    }

    AnalyticsSnapshot {
        opens: valid.len() as u64,
        last_opened: valid.last().map(|e| e.observed_at),
        devices,
        locations,
        open_history: valid.iter().cloned().map(OpenRecord::from).collect(),
    }
}
