//! Readers: long-lived views over the shared caches.
//!
//! A reader is mounted on a selected day, keeps its own loading and error
//! state, and resyncs when its store's bus reports a change.

mod hydration;
mod meals;
mod profile;
mod realtime;
mod records;
mod summary;

pub use hydration::HydrationHook;
pub use meals::MealsHook;
pub use profile::ProfileHook;
pub use realtime::RealtimeBridge;
pub use records::RecordsHook;
pub use summary::{DailySummary, DaySlot, WeeklySummary, WEEK_LEN};
