use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::TrackerError;
use crate::token::validate_tracking_id;
use crate::useragent::DeviceClass;

/// One recorded fetch of the tracking pixel. Append-only: a tracking id
/// accumulates as many of these as the pixel is fetched, and `observed_at`
/// is assigned by the server at write time.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OpenEvent {
    pub tracking_id: String,
    pub observed_at: DateTime<Utc>,
    pub device: DeviceClass,
    pub browser: String,
    pub os: String,
    pub ip_address: String,
    pub is_proxy: bool,
}

/// The message a tracking id was minted for. Written once when the
/// extension reports a completed send; upserts only tolerate duplicate
/// reports, they never change semantic content.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SentMessage {
    pub tracking_id: String,
    pub user_email: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// Raw send-confirmation payload from the browser extension. Everything is
/// optional at the wire: this gets validated into a [`SentMessage`] before
/// any of it reaches the registry or the aggregation engine.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReport {
    // older extension builds posted `toAddress`
    #[serde(alias = "toAddress")]
    pub to: Option<String>,
    pub subject: Option<String>,
    pub tracking_id: Option<String>,
    pub body: Option<String>,
    pub user_email: Option<String>,
}

impl SendReport {
    /// Validate the report and convert it into a registry record stamped
    /// with the server-side send time.
    pub fn into_message(self, sent_at: DateTime<Utc>) -> Result<SentMessage, TrackerError> {
        let recipient = non_empty(self.to).ok_or(TrackerError::MissingField("to"))?;
        let subject = non_empty(self.subject).ok_or(TrackerError::MissingField("subject"))?;
        let tracking_id =
            non_empty(self.tracking_id).ok_or(TrackerError::MissingField("trackingId"))?;
        validate_tracking_id(&tracking_id)?;

        Ok(SentMessage {
            tracking_id,
            user_email: self.user_email.unwrap_or_default(),
            recipient,
            subject,
            body: self.body.unwrap_or_default(),
            sent_at,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
