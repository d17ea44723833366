/// Router Module Index
///
/// Splits the HTTP surface by the authentication it needs. Authorization itself
/// is decided by the access policy inside the stores; the split only controls
/// whether a request must carry valid credentials before reaching a handler.

/// Routes open to anonymous callers: registration, token exchange and reads.
pub mod public;

/// Routes behind the `AuthUser` middleware.
pub mod authenticated;

/// Administrative user management, also behind the `AuthUser` middleware.
pub mod admin;
