use chrono::{DateTime, Utc};

/// Clock seam: store timestamps are assigned at write time through this
/// trait, never taken from the client, so tests can pin the clock.
pub trait TimeSource {
    fn current_time(&self) -> DateTime<Utc>;
}

#[derive(Clone)]
pub struct SystemTime {}

impl TimeSource for SystemTime {
    fn current_time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
