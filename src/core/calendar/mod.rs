//! Calendar scheduling tools backed by Google Calendar.

pub mod auth;
mod error;
pub mod google;
pub mod tools;

pub use auth::{CALENDAR_SCOPE, CredentialSource, GoogleAuthClient, TokenProvider};
pub use error::{CalendarError, GoogleError};
pub use google::{
    BusyInterval, CalendarService, CreatedEvent, GOOGLE_CALENDAR_BASE_URL, GoogleCalendarClient,
    NewEvent,
};
pub use tools::{
    CHECK_AVAILABILITY, CalendarSettings, SCHEDULE_APPOINTMENT, Scheduler, free_slots,
    register_calendar_tools,
};
