use chrono::{DateTime, Utc};

/// The current time as a unix timestamp in seconds.
#[cfg(not(test))]
pub fn now() -> u64 {
    timestamp(Utc::now())
}

/// During tests, the time is fixed.
#[cfg(test)]
pub fn now() -> u64 {
    use std::sync::LazyLock;
    static TIME: LazyLock<DateTime<Utc>> = LazyLock::new(Utc::now);
    timestamp(*TIME)
}

fn timestamp(time: DateTime<Utc>) -> u64 {
    u64::try_from(time.timestamp()).unwrap_or_default()
}
