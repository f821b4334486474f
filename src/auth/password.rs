//! Password scrambles for the MySQL authentication plugins

use crate::protocol::constants::{auth_plugin, SCRAMBLE_LEN};
use crate::{Error, Result};
use rand::Rng;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Generate a random 20-byte scramble.
///
/// NUL and 0xFF are avoided since the greeting stores the scramble as a
/// NUL-terminated string.
pub fn generate_scramble() -> [u8; SCRAMBLE_LEN] {
    let mut rng = rand::thread_rng();
    let mut scramble = [0u8; SCRAMBLE_LEN];
    for byte in scramble.iter_mut() {
        *byte = rng.gen_range(1..=0xFE);
    }
    scramble
}

/// `mysql_native_password`:
/// SHA1(password) XOR SHA1(scramble + SHA1(SHA1(password)))
pub fn native_password(password: &str, scramble: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    let stage1 = Sha1::digest(password.as_bytes());
    let stage2 = Sha1::digest(stage1);

    let mut hasher = Sha1::new();
    hasher.update(scramble);
    hasher.update(stage2);
    let stage3 = hasher.finalize();

    xor(&stage1, &stage3)
}

/// `caching_sha2_password` fast path:
/// SHA256(password) XOR SHA256(SHA256(SHA256(password)) + scramble)
pub fn caching_sha2(password: &str, scramble: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    let stage1 = Sha256::digest(password.as_bytes());
    let stage2 = Sha256::digest(stage1);

    let mut hasher = Sha256::new();
    hasher.update(stage2);
    hasher.update(scramble);
    let stage3 = hasher.finalize();

    xor(&stage1, &stage3)
}

/// Server side check of a `mysql_native_password` response
pub fn verify_native_password(password: &str, scramble: &[u8], response: &[u8]) -> bool {
    native_password(password, scramble) == response
}

/// Compute the auth response for the named plugin
pub fn auth_for_plugin(plugin: &str, password: &str, scramble: &[u8]) -> Result<Vec<u8>> {
    match plugin {
        auth_plugin::NATIVE_PASSWORD | "" => Ok(native_password(password, scramble)),
        auth_plugin::CACHING_SHA2_PASSWORD => Ok(caching_sha2(password, scramble)),
        auth_plugin::CLEAR_PASSWORD => {
            let mut out = password.as_bytes().to_vec();
            out.push(0);
            Ok(out)
        }
        other => Err(Error::Authentication(format!(
            "unsupported authentication plugin '{}'",
            other
        ))),
    }
}

fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b).map(|(x, y)| x ^ y).collect()
}
