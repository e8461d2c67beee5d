//! The `check_availability` and `schedule_appointment` tools.

use std::sync::Arc;

use chrono::{
    DateTime, Duration as ChronoDuration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::google::{BusyInterval, CalendarService, NewEvent};
use crate::core::llm::{ParameterKind, ToolDefinition, ToolError, ToolParameter, ToolRegistry};

pub const CHECK_AVAILABILITY: &str = "check_availability";
pub const SCHEDULE_APPOINTMENT: &str = "schedule_appointment";

const MAX_DURATION_MINUTES: i64 = 8 * 60;

/// Where and when appointments may be booked.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarSettings {
    pub calendar_id: String,
    /// Service-account JSON, a path to it, or empty for application defaults
    pub credentials: String,
    /// Local time zone of the business as a UTC offset
    pub utc_offset_minutes: i32,
    pub business_hours_start: u32,
    pub business_hours_end: u32,
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            calendar_id: String::new(),
            credentials: String::new(),
            utc_offset_minutes: 0,
            business_hours_start: 9,
            business_hours_end: 17,
        }
    }
}

impl CalendarSettings {
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }
}

#[derive(Debug, Deserialize)]
struct AvailabilityArgs {
    date: String,
    duration_minutes: i64,
}

#[derive(Debug, Deserialize)]
struct AppointmentArgs {
    date: String,
    time: String,
    duration_minutes: i64,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    notes: Option<String>,
}

/// Slot-finding and booking logic over a [`CalendarService`].
pub struct Scheduler {
    calendar: Arc<dyn CalendarService>,
    settings: CalendarSettings,
}

impl Scheduler {
    pub fn new(calendar: Arc<dyn CalendarService>, settings: CalendarSettings) -> Self {
        Self { calendar, settings }
    }

    /// Free slots of `duration_minutes` within business hours on `date`.
    pub async fn check_availability(&self, args: Value) -> Result<String, ToolError> {
        let args: AvailabilityArgs = parse_args(CHECK_AVAILABILITY, args)?;
        let date = parse_date(CHECK_AVAILABILITY, &args.date)?;
        let duration = parse_duration(CHECK_AVAILABILITY, args.duration_minutes)?;
        let (open, close) = self.business_window(CHECK_AVAILABILITY, date)?;

        let busy = self
            .calendar
            .busy_intervals(open, close)
            .await
            .map_err(|e| ToolError::Execution {
                tool: CHECK_AVAILABILITY.to_string(),
                reason: e.to_string(),
            })?;

        let slots: Vec<Value> = free_slots(open, close, duration, &busy)
            .into_iter()
            .map(|(start, end)| json!({ "start": start.to_rfc3339(), "end": end.to_rfc3339() }))
            .collect();
        info!(date = %date, slots = slots.len(), "Checked calendar availability");
        Ok(Value::Array(slots).to_string())
    }

    /// Book an appointment. Calendar failures are reported to the engine as
    /// `{"success": false, "error": ...}` so it can tell the caller.
    pub async fn schedule_appointment(&self, args: Value) -> Result<String, ToolError> {
        let args: AppointmentArgs = parse_args(SCHEDULE_APPOINTMENT, args)?;
        let date = parse_date(SCHEDULE_APPOINTMENT, &args.date)?;
        let time = NaiveTime::parse_from_str(args.time.trim(), "%H:%M").map_err(|e| {
            invalid(SCHEDULE_APPOINTMENT, format!("time must be HH:MM: {e}"))
        })?;
        let duration = parse_duration(SCHEDULE_APPOINTMENT, args.duration_minutes)?;
        let start = self
            .settings
            .offset()
            .from_local_datetime(&date.and_time(time))
            .single()
            .ok_or_else(|| invalid(SCHEDULE_APPOINTMENT, "ambiguous local time".to_string()))?;

        let mut description = vec![format!("Name: {}", args.name)];
        if let Some(email) = &args.email {
            description.push(format!("Email: {email}"));
        }
        if let Some(phone) = &args.phone {
            description.push(format!("Phone: {phone}"));
        }
        if let Some(notes) = &args.notes {
            description.push(format!("Notes: {notes}"));
        }

        let event = NewEvent {
            summary: format!("Appointment with {}", args.name),
            description: description.join("\n"),
            start,
            end: start + duration,
            attendee_email: args.email.filter(|e| !e.trim().is_empty()),
        };

        let result = match self.calendar.create_event(&event).await {
            Ok(created) => json!({
                "success": true,
                "eventId": created.id,
                "eventLink": created.link,
            }),
            Err(e) => {
                warn!(error = %e, "Failed to create calendar event");
                json!({ "success": false, "error": e.to_string() })
            }
        };
        Ok(result.to_string())
    }

    fn business_window(
        &self,
        tool: &str,
        date: NaiveDate,
    ) -> Result<(DateTime<FixedOffset>, DateTime<FixedOffset>), ToolError> {
        let offset = self.settings.offset();
        let at_hour = |hour: u32| {
            // Hour 24 closes at midnight of the following day
            let (day, clock_hour) = if hour == 24 {
                (date.succ_opt(), 0)
            } else {
                (Some(date), hour)
            };
            day.zip(NaiveTime::from_hms_opt(clock_hour, 0, 0))
                .and_then(|(d, t)| offset.from_local_datetime(&d.and_time(t)).single())
                .ok_or_else(|| invalid(tool, format!("invalid business hour {hour}")))
        };
        Ok((
            at_hour(self.settings.business_hours_start)?,
            at_hour(self.settings.business_hours_end)?,
        ))
    }
}

/// Slots stepping by `duration` from `open`, ending by `close`, clear of every busy span.
pub fn free_slots(
    open: DateTime<FixedOffset>,
    close: DateTime<FixedOffset>,
    duration: ChronoDuration,
    busy: &[BusyInterval],
) -> Vec<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
    let mut slots = Vec::new();
    if duration <= ChronoDuration::zero() {
        return slots;
    }
    let mut start = open;
    while start + duration <= close {
        let end = start + duration;
        let overlaps = busy.iter().any(|b| start < b.end && b.start < end);
        if !overlaps {
            slots.push((start, end));
        }
        start = end;
    }
    slots
}

fn invalid(tool: &str, reason: String) -> ToolError {
    ToolError::InvalidArguments {
        tool: tool.to_string(),
        reason,
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(tool: &str, args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| invalid(tool, e.to_string()))
}

fn parse_date(tool: &str, value: &str) -> Result<NaiveDate, ToolError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| invalid(tool, format!("date must be YYYY-MM-DD: {e}")))
}

fn parse_duration(tool: &str, minutes: i64) -> Result<ChronoDuration, ToolError> {
    if !(1..=MAX_DURATION_MINUTES).contains(&minutes) {
        return Err(invalid(
            tool,
            format!("duration_minutes must be between 1 and {MAX_DURATION_MINUTES}"),
        ));
    }
    Ok(ChronoDuration::minutes(minutes))
}

pub fn check_availability_definition() -> ToolDefinition {
    ToolDefinition::new(
        CHECK_AVAILABILITY,
        "List open appointment slots on a given date during business hours.",
        vec![
            ToolParameter::required("date", ParameterKind::String, "Date as YYYY-MM-DD"),
            ToolParameter::required(
                "duration_minutes",
                ParameterKind::Integer,
                "Length of the appointment in minutes",
            ),
        ],
    )
}

pub fn schedule_appointment_definition() -> ToolDefinition {
    ToolDefinition::new(
        SCHEDULE_APPOINTMENT,
        "Book an appointment on the calendar.",
        vec![
            ToolParameter::required("date", ParameterKind::String, "Date as YYYY-MM-DD"),
            ToolParameter::required("time", ParameterKind::String, "Start time as HH:MM (24h)"),
            ToolParameter::required(
                "duration_minutes",
                ParameterKind::Integer,
                "Length of the appointment in minutes",
            ),
            ToolParameter::required("name", ParameterKind::String, "Caller's full name"),
            ToolParameter::optional("email", ParameterKind::String, "Caller's email address"),
            ToolParameter::optional("phone", ParameterKind::String, "Caller's phone number"),
            ToolParameter::optional("notes", ParameterKind::String, "Anything else to note"),
        ],
    )
}

/// Register both calendar tools.
pub fn register_calendar_tools(registry: &mut ToolRegistry, scheduler: Arc<Scheduler>) {
    let availability = scheduler.clone();
    registry.register(check_availability_definition(), move |args| {
        let scheduler = availability.clone();
        async move { scheduler.check_availability(args).await }
    });

    registry.register(schedule_appointment_definition(), move |args| {
        let scheduler = scheduler.clone();
        async move { scheduler.schedule_appointment(args).await }
    });
}
