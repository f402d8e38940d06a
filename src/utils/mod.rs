// Utility functions
// Time windows, keyed locks, random draws

pub mod keyed_lock;
pub mod random;
pub mod time;

pub use keyed_lock::KeyedMutex;
pub use time::{bucket_window, utc_day_window};
