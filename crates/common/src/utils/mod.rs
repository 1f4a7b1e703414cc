mod encoding;
mod headers;
mod id;
mod time;

pub use encoding::{decode_body, decode_payload, encode_body, encode_payload};
pub use headers::{has_header, headers_to_map, map_to_headers};
pub use id::{generate_connection_id, generate_request_id};
pub use time::{current_timestamp_millis, iso_timestamp};
