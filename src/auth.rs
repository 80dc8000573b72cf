//! Auth-domain values: redacted secrets, issued credentials, context values, and client assertions.

pub mod assertion;
pub mod context;
pub mod credential;
pub mod secret;

pub use assertion::*;
pub use context::*;
pub use credential::*;
pub use secret::*;
