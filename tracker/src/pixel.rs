use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, EXPIRES, PRAGMA, USER_AGENT};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum_client_ip::InsecureClientIp;
use metrics::counter;
use serde::Deserialize;
use tracing::instrument;

use crate::api::TrackerError;
use crate::event::OpenEvent;
use crate::prometheus::report_dropped_opens;
use crate::router;
use crate::useragent::{classify_user_agent, is_proxy_fetch};

/// 1x1 transparent GIF, bit-identical to the pixel the extension has been
/// embedding since day one. Strict mail clients validate image responses,
/// so these bytes and the headers below are part of the wire contract.
pub const TRANSPARENT_GIF: [u8; 42] = [
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, // GIF89a
    0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0x21, 0xf9,
    0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00,
    0x00, 0x02, 0x01, 0x44, 0x00, 0x3b,
];

#[derive(Deserialize, Default)]
pub struct PixelQuery {
    // the extension appends a &rand= cache buster, which we ignore
    pub id: Option<String>,
}

/// The one response shape this endpoint is allowed to produce on the happy
/// path: image bytes plus headers that defeat every cache between us and
/// the recipient's mail client.
pub struct Pixel;

impl IntoResponse for Pixel {
    fn into_response(self) -> Response {
        (
            [
                (CONTENT_TYPE, "image/gif"),
                (CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
                (PRAGMA, "no-cache"),
                (EXPIRES, "0"),
            ],
            TRANSPARENT_GIF,
        )
            .into_response()
    }
}

/// `GET /open?id=<trackingId>`: the only untrusted-network-facing piece
/// of the core. A missing id is the single validation failure; once past
/// that, the pixel is served no matter what the store does.
#[instrument(skip_all, fields(tracking_id, device, is_proxy))]
pub async fn open(
    state: State<router::State>,
    InsecureClientIp(ip): InsecureClientIp,
    Query(query): Query<PixelQuery>,
    headers: HeaderMap,
) -> Result<Pixel, TrackerError> {
    let tracking_id = query
        .id
        .filter(|id| !id.is_empty())
        .ok_or(TrackerError::MissingTrackingId)?;

    let user_agent = headers
        .get(USER_AGENT)
        .map_or("", |v| v.to_str().unwrap_or(""));

    let info = classify_user_agent(user_agent);
    let is_proxy = is_proxy_fetch(user_agent, ip);

    tracing::Span::current().record("tracking_id", tracking_id.as_str());
    tracing::Span::current().record("device", info.device.as_str());
    tracing::Span::current().record("is_proxy", is_proxy);

    counter!("tracker_opens_received_total").increment(1);

    let event = OpenEvent {
        tracking_id,
        // write-time server clock is authoritative, never the client
        observed_at: state.timesource.current_time(),
        device: info.device,
        browser: info.browser,
        os: info.os,
        ip_address: ip.to_string(),
        is_proxy,
    };

    // Best-effort append, bounded so a slow store cannot hold the image
    // hostage. Failures are logged and counted, never surfaced: the pixel
    // must not visibly break the email-viewing experience.
    match tokio::time::timeout(state.append_timeout, state.events.append(event)).await {
        Ok(Ok(())) => {
            counter!("tracker_opens_recorded_total").increment(1);
        }
        Ok(Err(err)) => {
            report_dropped_opens("store_error", 1);
            tracing::warn!("failed to record open event: {}", err);
        }
        Err(_) => {
            report_dropped_opens("timeout", 1);
            tracing::warn!(
                "open event append timed out after {:?}",
                state.append_timeout
            );
        }
    }

    Ok(Pixel)
}

#[cfg(test)]
mod tests {
    use super::TRANSPARENT_GIF;

    #[test]
    fn pixel_is_a_wellformed_gif() {
        assert_eq!(TRANSPARENT_GIF.len(), 42);
        assert_eq!(&TRANSPARENT_GIF[..6], b"GIF89a");
        // 1x1 logical screen
        assert_eq!(&TRANSPARENT_GIF[6..10], &[0x01u8, 0x00, 0x01, 0x00]);
        // GIF trailer
        assert_eq!(TRANSPARENT_GIF[41], 0x3b);
    }
}
