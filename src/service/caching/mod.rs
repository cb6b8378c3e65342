pub mod collections;
pub mod redis;

pub use self::redis::{CacheError, RedisCache};

pub const KEY_PREFIX: &str = "concall-sync";
