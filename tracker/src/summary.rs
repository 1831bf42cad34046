use std::time::Duration;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use crate::api::TrackerError;
use crate::router;

const TITLE_MAX: usize = 50;
const PREVIEW_MAX: usize = 300;
const SUMMARIZE_INPUT_MAX: usize = 1000;

/// Models tried in order; the first one that answers wins.
const MODELS: &[&str] = &[
    "facebook/bart-large-cnn",
    "sshleifer/distilbart-cnn-12-6",
    "google/pegasus-xsum",
];

/// Closed category set for the keyword tagger. Matching is closed-world:
/// a message gets labels from this list or `Personal`, never a free-form
/// string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Work,
    Finance,
    Events,
    Marketing,
    Account,
    Personal,
    General,
}

const KEYWORD_TABLES: &[(Category, &[&str])] = &[
    (
        Category::Work,
        &["meeting", "work", "project", "deadline", "coding", "team"],
    ),
    (
        Category::Finance,
        &["invoice", "payment", "money", "bill", "transaction"],
    ),
    (
        Category::Events,
        &["event", "party", "celebration", "invitation"],
    ),
    (
        Category::Marketing,
        &["sale", "offer", "promotion", "discount", "newsletter"],
    ),
    (
        Category::Account,
        &["confirm", "verify", "account", "signup"],
    ),
];

const MAX_TAGS: usize = 3;

/// Keyword categorization over subject + correspondent + body.
pub fn categorize(subject: &str, from: &str, body: &str) -> Vec<Category> {
    let text = format!("{subject} {from} {body}").to_lowercase();

    let mut tags: Vec<Category> = KEYWORD_TABLES
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
        .map(|(category, _)| *category)
        .collect();

    if tags.is_empty() {
        tags.push(Category::Personal);
    }
    tags.truncate(MAX_TAGS);
    tags
}

pub struct EmailSummary {
    pub title: String,
    pub tags: Vec<Category>,
    pub preview: String,
}

/// Upstream summarization client. Every failure mode collapses into the
/// truncated-preview fallback, so callers never see an upstream error.
pub struct Summarizer {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl Summarizer {
    pub fn new(
        api_url: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Summarizer> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Summarizer {
            client,
            api_url,
            api_key,
        })
    }

    pub async fn summarize(&self, subject: &str, from: &str, body: &str) -> EmailSummary {
        let clean_body = if looks_like_html(body) {
            strip_tags(body)
        } else {
            body.to_string()
        };

        let text = format!("Subject: {subject}\nFrom: {from}\n\n{clean_body}");

        for model in MODELS.iter().copied() {
            match self.request_summary(model, &text).await {
                Ok(Some(summary)) => {
                    tracing::debug!(model, "summarization succeeded");
                    return EmailSummary {
                        title: truncate_chars(subject, TITLE_MAX),
                        tags: categorize(subject, from, &clean_body),
                        preview: summary,
                    };
                }
                Ok(None) => tracing::debug!(model, "model returned no summary"),
                Err(err) => tracing::warn!(model, "summarization request failed: {}", err),
            }
        }

        // All models failed: recover locally with a truncated preview
        // rather than surfacing the upstream error.
        EmailSummary {
            title: truncate_chars(subject, TITLE_MAX),
            tags: vec![Category::General],
            preview: truncate_chars(&clean_body, PREVIEW_MAX),
        }
    }

    async fn request_summary(&self, model: &str, text: &str) -> reqwest::Result<Option<String>> {
        #[derive(Deserialize)]
        struct ModelOutput {
            summary_text: Option<String>,
        }

        let input: String = text.chars().take(SUMMARIZE_INPUT_MAX).collect();

        let mut request = self
            .client
            .post(format!("{}/{}", self.api_url, model))
            .json(&json!({
                "inputs": input,
                "parameters": {
                    "max_length": 300,
                    "min_length": 50,
                    "do_sample": false,
                    "num_beams": 3,
                },
            }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?.error_for_status()?;
        let outputs: Vec<ModelOutput> = response.json().await?;

        Ok(outputs.into_iter().next().and_then(|o| o.summary_text))
    }
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub summary: String,
    pub tags: Vec<Category>,
}

/// `POST /emails/{trackingId}/summarize`: summarize the body snapshot the
/// registry holds for this message.
#[instrument(skip_all, fields(tracking_id = %tracking_id))]
pub async fn summarize(
    state: State<router::State>,
    Path(tracking_id): Path<String>,
) -> Result<Json<SummaryResponse>, TrackerError> {
    let message = state
        .registry
        .get(&tracking_id)
        .await
        .map_err(|err| {
            tracing::error!("failed to load sent email: {}", err);
            err
        })?
        .ok_or(TrackerError::UnknownTrackingId)?;

    let summary = state
        .summarizer
        .summarize(&message.subject, &message.user_email, &message.body)
        .await;

    Ok(Json(SummaryResponse {
        summary: summary.preview,
        tags: summary.tags,
    }))
}

fn looks_like_html(content: &str) -> bool {
    let trimmed = content.trim_start();
    trimmed.starts_with("<html") || content.contains("<body") || content.contains("<div")
}

/// Drop tags, collapse the leftover whitespace. Good enough for preview
/// text; this is not an HTML parser.
fn strip_tags(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut in_tag = false;
    for c in content.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            c if !in_tag => out.push(c),
            _ => {}
        }
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{categorize, looks_like_html, strip_tags, truncate_chars, Category};

    #[test]
    fn keywords_map_to_their_categories() {
        let tags = categorize("Team meeting", "boss@corp.com", "project deadline is friday");
        assert_eq!(tags, vec![Category::Work]);

        let tags = categorize("Your invoice", "billing@shop.com", "payment due");
        assert_eq!(tags, vec![Category::Finance]);
    }

    #[test]
    fn unmatched_text_falls_back_to_personal() {
        let tags = categorize("hey", "friend@mail.com", "long time no see");
        assert_eq!(tags, vec![Category::Personal]);
    }

    #[test]
    fn at_most_three_tags() {
        let tags = categorize(
            "Work party invoice",
            "x@y.com",
            "meeting invitation, newsletter offer, verify your account",
        );
        assert_eq!(tags.len(), 3);
        assert_eq!(
            tags,
            vec![Category::Work, Category::Finance, Category::Events]
        );
    }

    #[test]
    fn tags_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&vec![Category::Work, Category::General]).unwrap(),
            r#"["work","general"]"#
        );
    }

    #[test]
    fn html_bodies_are_detected_and_stripped() {
        let html = "<html><body><div>Hello   <b>world</b></div></body></html>";
        assert!(looks_like_html(html));
        assert_eq!(strip_tags(html), "Hello world");

        assert!(!looks_like_html("plain text with a < sign? no"));
    }

    #[test]
    fn previews_truncate_on_char_boundaries() {
        let short = truncate_chars("hello", 300);
        assert_eq!(short, "hello");

        let long_input = "é".repeat(400);
        let long = truncate_chars(&long_input, 300);
        assert_eq!(long.chars().count(), 303);
        assert!(long.ends_with("..."));
    }
}
