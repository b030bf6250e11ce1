pub mod id;
pub mod snowflake;
pub mod wire;

pub use id::PrefixedId;
pub use snowflake::SnowflakeGenerator;
