//! Google Calendar v3 REST client (freebusy query and event insert).

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::auth::TokenProvider;
use super::error::CalendarError;

pub const GOOGLE_CALENDAR_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

/// A busy span on the calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct BusyInterval {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

/// Event to create.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub summary: String,
    pub description: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub attendee_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedEvent {
    pub id: String,
    pub link: Option<String>,
}

/// The calendar operations the scheduling tools need.
#[async_trait::async_trait]
pub trait CalendarService: Send + Sync {
    async fn busy_intervals(
        &self,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Result<Vec<BusyInterval>, CalendarError>;

    async fn create_event(&self, event: &NewEvent) -> Result<CreatedEvent, CalendarError>;
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: std::collections::HashMap<String, FreeBusyCalendar>,
}

#[derive(Debug, Default, Deserialize)]
struct FreeBusyCalendar {
    #[serde(default)]
    busy: Vec<RawInterval>,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawInterval {
    start: String,
    end: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventResponse {
    id: String,
    html_link: Option<String>,
}

pub struct GoogleCalendarClient {
    http: reqwest::Client,
    base_url: String,
    calendar_id: String,
    tokens: Arc<dyn TokenProvider>,
}

impl GoogleCalendarClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        calendar_id: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            calendar_id: calendar_id.into(),
            tokens,
        }
    }

    pub fn calendar_id(&self) -> &str {
        &self.calendar_id
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        body: &serde_json::Value,
    ) -> Result<T, CalendarError> {
        let token = self.tokens.get_token().await?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| CalendarError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CalendarError::from_status(status, body));
        }
        response
            .json()
            .await
            .map_err(|e| CalendarError::InvalidResponse(e.to_string()))
    }
}

fn parse_instant(value: &str) -> Result<DateTime<FixedOffset>, CalendarError> {
    DateTime::parse_from_rfc3339(value)
        .map_err(|e| CalendarError::InvalidResponse(format!("bad timestamp '{value}': {e}")))
}

#[async_trait::async_trait]
impl CalendarService for GoogleCalendarClient {
    async fn busy_intervals(
        &self,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Result<Vec<BusyInterval>, CalendarError> {
        let body = json!({
            "timeMin": start.to_rfc3339(),
            "timeMax": end.to_rfc3339(),
            "items": [{ "id": self.calendar_id }],
        });
        let response: FreeBusyResponse = self
            .post_json(format!("{}/freeBusy", self.base_url), &body)
            .await?;

        let calendar = response
            .calendars
            .get(&self.calendar_id)
            .ok_or_else(|| {
                CalendarError::InvalidResponse(format!(
                    "calendar '{}' missing from freebusy response",
                    self.calendar_id
                ))
            })?;
        if let Some(first) = calendar.errors.first() {
            return Err(CalendarError::InvalidResponse(format!(
                "freebusy reported an error: {first}"
            )));
        }

        let intervals = calendar
            .busy
            .iter()
            .map(|raw| {
                Ok(BusyInterval {
                    start: parse_instant(&raw.start)?,
                    end: parse_instant(&raw.end)?,
                })
            })
            .collect::<Result<Vec<_>, CalendarError>>()?;
        debug!(busy = intervals.len(), "Fetched calendar busy intervals");
        Ok(intervals)
    }

    async fn create_event(&self, event: &NewEvent) -> Result<CreatedEvent, CalendarError> {
        let mut body = json!({
            "summary": event.summary,
            "description": event.description,
            "start": { "dateTime": event.start.to_rfc3339() },
            "end": { "dateTime": event.end.to_rfc3339() },
        });
        if let Some(email) = &event.attendee_email {
            body["attendees"] = json!([{ "email": email }]);
        }

        let url = format!(
            "{}/calendars/{}/events",
            self.base_url,
            url::form_urlencoded::byte_serialize(self.calendar_id.as_bytes()).collect::<String>()
        );
        let created: EventResponse = self.post_json(url, &body).await?;
        info!(event_id = %created.id, "Created calendar event");

        Ok(CreatedEvent {
            id: created.id,
            link: created.html_link,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::calendar::auth::StaticTokenProvider;
    use crate::core::calendar::error::GoogleError;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GoogleCalendarClient {
        GoogleCalendarClient::new(
            reqwest::Client::new(),
            server.uri(),
            "team@example.com",
            Arc::new(StaticTokenProvider("ya29.test".to_string())),
        )
    }

    fn at(value: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(value).unwrap()
    }

    #[tokio::test]
    async fn test_busy_intervals() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/freeBusy"))
            .and(bearer_token("ya29.test"))
            .and(body_partial_json(json!({"items": [{"id": "team@example.com"}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "calendars": {
                    "team@example.com": {
                        "busy": [{"start": "2025-03-04T10:00:00Z", "end": "2025-03-04T11:00:00Z"}]
                    }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let busy = client(&server)
            .busy_intervals(at("2025-03-04T09:00:00Z"), at("2025-03-04T17:00:00Z"))
            .await
            .unwrap();

        assert_eq!(
            busy,
            vec![BusyInterval {
                start: at("2025-03-04T10:00:00Z"),
                end: at("2025-03-04T11:00:00Z"),
            }]
        );
    }

    #[tokio::test]
    async fn test_busy_intervals_calendar_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/freeBusy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "calendars": {
                    "team@example.com": { "errors": [{"domain": "global", "reason": "notFound"}] }
                }
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .busy_intervals(at("2025-03-04T09:00:00Z"), at("2025-03-04T17:00:00Z"))
            .await
            .unwrap_err();
        assert!(matches!(err, CalendarError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_create_event() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendars/team%40example.com/events"))
            .and(body_partial_json(json!({
                "summary": "Appointment with Ada",
                "attendees": [{"email": "ada@example.com"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "evt123",
                "htmlLink": "https://calendar.google.com/event?eid=evt123"
            })))
            .mount(&server)
            .await;

        let created = client(&server)
            .create_event(&NewEvent {
                summary: "Appointment with Ada".to_string(),
                description: "Name: Ada".to_string(),
                start: at("2025-03-04T10:00:00Z"),
                end: at("2025-03-04T10:30:00Z"),
                attendee_email: Some("ada@example.com".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(created.id, "evt123");
        assert_eq!(
            created.link.as_deref(),
            Some("https://calendar.google.com/event?eid=evt123")
        );
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
            .mount(&server)
            .await;

        let err = client(&server)
            .busy_intervals(at("2025-03-04T09:00:00Z"), at("2025-03-04T17:00:00Z"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CalendarError::Auth(GoogleError::AuthenticationFailed("invalid token".to_string()))
        );
    }
}
