mod message;
mod request;
mod response;
mod status;

pub use message::{ErrorCode, Message};
pub use request::{FallbackRequest, ProxyRequest};
pub use response::{BodyEncoding, FallbackError, HttpResponse, ProxyError, ProxyResponse};
pub use status::{EgressState, StatusReport};
