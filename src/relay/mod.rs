//! Relay commands, retry policy, and schedules over the automation webhook.

pub mod client;
pub mod retry;
pub mod schedule;

pub use client::{RelayClient, RelayReceipt, verify_power};
pub use retry::RetryPolicy;
pub use schedule::{NewSchedule, ScheduleEntry, fetch_schedule, parse_schedule};
