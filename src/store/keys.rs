/// Session records are keyed by the owning user id.
pub fn session_key(user_id: &str) -> String {
    user_id.to_string()
}

/// History entries are keyed `{owner_id}:{time_in_ms:020}` so all entries for
/// one user are a contiguous prefix scan, ordered by session start.
pub fn history_key(owner_id: &str, time_in_ms: i64) -> String {
    let ts = time_in_ms.max(0) as u64;
    format!("{}:{:020}", owner_id, ts)
}

pub fn history_prefix(owner_id: &str) -> String {
    format!("{}:", owner_id)
}
