//! User administration
//!
//! Listing, lookup and creation of accounts. The HTTP routes for these are
//! gated to the configured admin roles.

pub mod service;

pub use service::{CreateUserRequest, UserResponse, UserService};
