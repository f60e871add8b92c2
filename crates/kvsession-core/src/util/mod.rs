/// Length of identifiers produced by [`generate_session_id`].
pub const SESSION_ID_LEN: usize = 32;

/// Generate a new session identifier.
///
/// UUIDv7 rendered as 32 lowercase hex chars: a millisecond timestamp prefix
/// followed by random bits, so ids sort by creation time and stay unique
/// across processes sharing one backend.
pub fn generate_session_id() -> String {
    uuid::Uuid::now_v7().simple().to_string()
}

/// Current Unix time in whole seconds.
pub fn unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
