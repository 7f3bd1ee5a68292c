//! Cross-cutting HTTP middleware
//!
//! Author: hephaex@gmail.com

pub mod api_key;
pub mod security_headers;

pub use api_key::{require_api_key, ApiKey, API_KEY_HEADER};
pub use security_headers::{security_headers_middleware, SecurityHeaders};
