//! Authentication and authorization module
//!
//! This module provides JWT-based authentication with the following components:
//! - Token issuance and validation (`jwt`)
//! - Password hashing with Argon2id (`password`)
//! - Bearer authentication and role gating middleware (`middleware`)
//! - Login, refresh and registration (`service`)

pub mod jwt;
pub mod middleware;
pub mod password;
pub mod service;

pub use jwt::{Claims, TokenCodec, TokenError, TokenKind};
pub use middleware::{bearer_token, require_auth, require_roles, AuthContext, AuthError, RoleGate};
pub use password::{hash_password_with_config, verify_password, PasswordConfig, PasswordError};
pub use service::{AuthService, LoginRequest, ProfileResponse, RegisterRequest, TokenPair};
