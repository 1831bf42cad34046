use axum::extract::{Query, State};
use axum::Json;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::analytics::{aggregate, AnalyticsSnapshot};
use crate::api::{TrackerError, TrackerResponse, TrackerResponseCode};
use crate::event::{SendReport, SentMessage};
use crate::router;

/// `POST /extension/email-sent`: the extension confirms a completed send.
///
/// The payload is untyped at the wire and may arrive more than once for the
/// same send; it is validated into a [`SentMessage`] here and upserted
/// idempotently, so the registry never grows a second row for a duplicate
/// report.
#[instrument(skip_all, fields(tracking_id))]
pub async fn email_sent(
    state: State<router::State>,
    body: Bytes,
) -> Result<Json<TrackerResponse>, TrackerError> {
    let report: SendReport = serde_json::from_slice(&body)?;

    let message = report.into_message(state.timesource.current_time())?;
    tracing::Span::current().record("tracking_id", message.tracking_id.as_str());

    state.registry.upsert(message).await.map_err(|err| {
        tracing::error!("failed to register sent email: {}", err);
        err
    })?;

    counter!("tracker_emails_registered_total").increment(1);

    Ok(Json(TrackerResponse {
        status: TrackerResponseCode::Ok,
    }))
}

#[derive(Deserialize, Default)]
pub struct OwnerQuery {
    pub email: Option<String>,
}

/// One sent message with its computed engagement view.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentEmailView {
    pub tracking_id: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub analytics: AnalyticsSnapshot,
}

/// `GET /emails/sent?email=<owner>`: every message the owner sent, newest
/// first, each enriched with a snapshot computed from its event log. A
/// store failure surfaces as a 500: the dashboard distinguishes "errored"
/// from "zero opens", so we never fabricate partial results.
#[instrument(skip_all, fields(owner, messages))]
pub async fn sent_emails(
    state: State<router::State>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<Vec<SentEmailView>>, TrackerError> {
    let owner = query
        .email
        .filter(|email| !email.is_empty())
        .ok_or(TrackerError::MissingField("email"))?;
    tracing::Span::current().record("owner", owner.as_str());

    let messages = state.registry.list_for_owner(&owner).await.map_err(|err| {
        tracing::error!("failed to list sent emails: {}", err);
        err
    })?;
    tracing::Span::current().record("messages", messages.len());

    let mut views = Vec::with_capacity(messages.len());
    for message in messages {
        let opens = state
            .events
            .opens_for(&message.tracking_id)
            .await
            .map_err(|err| {
                tracing::error!("failed to load open events: {}", err);
                err
            })?;

        views.push(enrich(message, aggregate(opens)));
    }

    Ok(Json(views))
}

fn enrich(message: SentMessage, analytics: AnalyticsSnapshot) -> SentEmailView {
    SentEmailView {
        tracking_id: message.tracking_id,
        recipient: message.recipient,
        subject: message.subject,
        body: message.body,
        sent_at: message.sent_at,
        analytics,
    }
}
