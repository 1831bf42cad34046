use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use tracing::info;

use crate::event::{OpenEvent, SentMessage};
use crate::store::{EventStore, MailRegistry, StoreError};
use crate::useragent::DeviceClass;

/// Postgres-backed event store and registry, sharing one pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn new(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        info!("connecting to postgres...");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(StoreError::Connection)?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("connected to postgres, migrations applied");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct OpenEventRow {
    tracking_id: String,
    observed_at: DateTime<Utc>,
    device_type: String,
    browser: String,
    os: String,
    ip_address: String,
    is_proxy: bool,
}

impl From<OpenEventRow> for OpenEvent {
    fn from(row: OpenEventRow) -> Self {
        OpenEvent {
            tracking_id: row.tracking_id,
            observed_at: row.observed_at,
            // Stored labels come from DeviceClass, but stay total anyway.
            device: DeviceClass::from_label(&row.device_type),
            browser: row.browser,
            os: row.os,
            ip_address: row.ip_address,
            is_proxy: row.is_proxy,
        }
    }
}

#[derive(Debug, FromRow)]
struct SentMessageRow {
    tracking_id: String,
    user_email: String,
    recipient: String,
    subject: String,
    body: String,
    sent_at: DateTime<Utc>,
}

impl From<SentMessageRow> for SentMessage {
    fn from(row: SentMessageRow) -> Self {
        SentMessage {
            tracking_id: row.tracking_id,
            user_email: row.user_email,
            recipient: row.recipient,
            subject: row.subject,
            body: row.body,
            sent_at: row.sent_at,
        }
    }
}

#[async_trait]
impl EventStore for PostgresStore {
    async fn append(&self, event: OpenEvent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO open_events
                (tracking_id, observed_at, device_type, browser, os, ip_address, is_proxy)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&event.tracking_id)
        .bind(event.observed_at)
        .bind(event.device.as_str())
        .bind(&event.browser)
        .bind(&event.os)
        .bind(&event.ip_address)
        .bind(event.is_proxy)
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::Query {
            operation: "append open_event",
            error,
        })?;

        Ok(())
    }

    async fn opens_for(&self, tracking_id: &str) -> Result<Vec<OpenEvent>, StoreError> {
        let rows: Vec<OpenEventRow> = sqlx::query_as(
            r#"
            SELECT tracking_id, observed_at, device_type, browser, os, ip_address, is_proxy
            FROM open_events
            WHERE tracking_id = $1
            ORDER BY observed_at ASC, id ASC
            "#,
        )
        .bind(tracking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| StoreError::Query {
            operation: "select open_events",
            error,
        })?;

        Ok(rows.into_iter().map(OpenEvent::from).collect())
    }
}

#[async_trait]
impl MailRegistry for PostgresStore {
    async fn upsert(&self, message: SentMessage) -> Result<(), StoreError> {
        // First non-empty field wins: a duplicate report may fill columns
        // the first one left empty, but never overwrites a non-empty value,
        // and sent_at stays at the first report's time.
        sqlx::query(
            r#"
            INSERT INTO sent_emails
                (tracking_id, user_email, recipient, subject, body, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (tracking_id) DO UPDATE SET
                user_email = CASE WHEN sent_emails.user_email = ''
                    THEN EXCLUDED.user_email ELSE sent_emails.user_email END,
                recipient = CASE WHEN sent_emails.recipient = ''
                    THEN EXCLUDED.recipient ELSE sent_emails.recipient END,
                subject = CASE WHEN sent_emails.subject = ''
                    THEN EXCLUDED.subject ELSE sent_emails.subject END,
                body = CASE WHEN sent_emails.body = ''
                    THEN EXCLUDED.body ELSE sent_emails.body END
            "#,
        )
        .bind(&message.tracking_id)
        .bind(&message.user_email)
        .bind(&message.recipient)
        .bind(&message.subject)
        .bind(&message.body)
        .bind(message.sent_at)
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::Query {
            operation: "upsert sent_email",
            error,
        })?;

        Ok(())
    }

    async fn get(&self, tracking_id: &str) -> Result<Option<SentMessage>, StoreError> {
        let row: Option<SentMessageRow> = sqlx::query_as(
            r#"
            SELECT tracking_id, user_email, recipient, subject, body, sent_at
            FROM sent_emails
            WHERE tracking_id = $1
            "#,
        )
        .bind(tracking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| StoreError::Query {
            operation: "select sent_email",
            error,
        })?;

        Ok(row.map(SentMessage::from))
    }

    async fn list_for_owner(&self, owner: &str) -> Result<Vec<SentMessage>, StoreError> {
        let rows: Vec<SentMessageRow> = sqlx::query_as(
            r#"
            SELECT tracking_id, user_email, recipient, subject, body, sent_at
            FROM sent_emails
            WHERE user_email = $1
            ORDER BY sent_at DESC
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| StoreError::Query {
            operation: "list sent_emails",
            error,
        })?;

        Ok(rows.into_iter().map(SentMessage::from).collect())
    }
}
