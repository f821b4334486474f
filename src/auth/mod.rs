//! Authentication
//!
//! Scramble computation for `mysql_native_password` and
//! `caching_sha2_password`, plus the random challenge used by the mock server.

mod password;

pub use password::{
    auth_for_plugin, caching_sha2, generate_scramble, native_password, verify_native_password,
};
