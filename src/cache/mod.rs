//! Shared per-day record cache.
//!
//! Records are cached per entity type and per local calendar day. Every
//! change clears the whole cache for that entity and bumps a version that
//! readers listen to, so all of them refetch what they display.

mod bus;
mod day_cache;
mod store;
mod traits;

pub use bus::{InvalidationBus, Subscription};
pub use day_cache::DayCache;
pub use store::RecordStore;
pub use traits::DailyRecord;

#[cfg(test)]
pub(crate) use store::testing;
