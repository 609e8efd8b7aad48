//! Build information and service metadata

/// Service name, also the default user-agent token
pub const NAME: &str = "privytar";

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default link to the service homepage
pub const HOMEPAGE: &str = "https://privytar.com/";

/// Upstream avatar endpoint; identifiers are appended directly
pub const GRAVATAR_AVATAR_BASE: &str = "https://secure.gravatar.com/avatar/";
