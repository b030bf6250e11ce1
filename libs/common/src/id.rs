use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = lounge_common::id::prefixed_ulid("room");
/// assert!(id.starts_with("room_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Marker trait for types that represent a prefixed ID.
pub trait PrefixedId {
    const PREFIX: &'static str;

    fn generate() -> String {
        prefixed_ulid(Self::PREFIX)
    }
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const USER: &str = "usr";
    pub const ROOM: &str = "room";
    pub const SESSION: &str = "ses";
    /// One per open stream; scopes liveness keys.
    pub const CONNECTION: &str = "conn";
    pub const ACCESS_TOKEN: &str = "lat";
}
