//! Authentication scrambles for the two common server plugins.
//!
//! `mysql_native_password` (MariaDB default):
//!
//! ```text
//! SHA1(password) XOR SHA1(nonce ++ SHA1(SHA1(password)))
//! ```
//!
//! `caching_sha2_password` (MySQL 8 default):
//!
//! ```text
//! SHA256(password) XOR SHA256(SHA256(SHA256(password)) ++ nonce)
//! ```
//!
//! An empty password always answers with an empty scramble.

use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Plugin names as advertised in the server greeting.
pub const NATIVE_PASSWORD: &str = "mysql_native_password";
pub const CACHING_SHA2: &str = "caching_sha2_password";

/// Compute the auth response for the given plugin and nonce.
///
/// Unknown plugins yield `None`; the caller reports the plugin name in
/// its protocol error.
pub fn scramble(plugin: &str, password: &str, nonce: &[u8]) -> Option<Vec<u8>> {
    if password.is_empty() {
        return match plugin {
            NATIVE_PASSWORD | CACHING_SHA2 => Some(Vec::new()),
            _ => None,
        };
    }
    match plugin {
        NATIVE_PASSWORD => Some(scramble_native(password.as_bytes(), nonce)),
        CACHING_SHA2 => Some(scramble_sha2(password.as_bytes(), nonce)),
        _ => None,
    }
}

// `sha1` and `sha2` share the `digest::Digest` trait, so one import
// serves both hashers.
fn sha1(chunks: &[&[u8]]) -> Vec<u8> {
    let mut hasher = Sha1::new();
    for chunk in chunks {
        hasher.update(chunk);
    }
    hasher.finalize().to_vec()
}

fn sha256(chunks: &[&[u8]]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk);
    }
    hasher.finalize().to_vec()
}

fn scramble_native(password: &[u8], nonce: &[u8]) -> Vec<u8> {
    let stage1 = sha1(&[password]);
    let stage2 = sha1(&[&stage1]);
    let mix = sha1(&[nonce, &stage2]);
    stage1.iter().zip(mix).map(|(a, b)| a ^ b).collect()
}

fn scramble_sha2(password: &[u8], nonce: &[u8]) -> Vec<u8> {
    let stage1 = sha256(&[password]);
    let stage2 = sha256(&[&stage1]);
    let mix = sha256(&[&stage2, nonce]);
    stage1.iter().zip(mix).map(|(a, b)| a ^ b).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONCE: &[u8; 20] = b"abcdefghijklmnopqrst";

    #[test]
    fn empty_password_is_an_empty_response() {
        assert_eq!(scramble(NATIVE_PASSWORD, "", NONCE), Some(Vec::new()));
        assert_eq!(scramble(CACHING_SHA2, "", NONCE), Some(Vec::new()));
    }

    #[test]
    fn unknown_plugin_is_rejected() {
        assert_eq!(scramble("sha256_password", "pw", NONCE), None);
    }

    #[test]
    fn native_scramble_is_twenty_bytes() {
        let out = scramble(NATIVE_PASSWORD, "secret", NONCE).unwrap();
        assert_eq!(out.len(), 20);
    }

    #[test]
    fn sha2_scramble_is_thirty_two_bytes() {
        let out = scramble(CACHING_SHA2, "secret", NONCE).unwrap();
        assert_eq!(out.len(), 32);
    }

    #[test]
    fn scramble_depends_on_the_nonce() {
        let a = scramble(NATIVE_PASSWORD, "secret", NONCE).unwrap();
        let b = scramble(NATIVE_PASSWORD, "secret", b"ABCDEFGHIJKLMNOPQRST").unwrap();
        assert_ne!(a, b);
        // Same inputs, same output.
        assert_eq!(a, scramble(NATIVE_PASSWORD, "secret", NONCE).unwrap());
    }
}
