use rand::distributions::Alphanumeric;
use rand::{Rng, thread_rng};
use uuid::Uuid;

/// Length of executor-assigned connection identifiers
const CONNECTION_ID_LEN: usize = 7;

/// Generate a short, lowercase alphanumeric connection identifier
pub fn generate_connection_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CONNECTION_ID_LEN)
        .map(|c| c.to_ascii_lowercase())
        .map(char::from)
        .collect()
}

/// Generate a unique correlation token using UUID v4
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}
