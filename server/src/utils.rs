use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Current time in milliseconds since the Unix epoch
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis()
        .min(u64::MAX as u128) as u64
}

// Player ids are handed out as p1, p2, ...
pub fn player_id(sequence: u64) -> String {
    format!("p{}", sequence)
}

pub fn coin_id(index: usize) -> String {
    format!("c{}", index)
}
