//! Collision-resistant identifiers for namespacing provisioned resources.
//!
//! Identifiers are drawn from a v4 UUID and rendered in lowercase base-36 so
//! they are valid in the resource names of every major cloud (no upper case,
//! no punctuation). Ten characters carry ~51 bits of entropy.

use uuid::Uuid;

/// Length of identifiers returned by [`unique_id`].
pub const ID_LEN: usize = 10;

/// Prefix used by the provider suite for generated project names.
pub const DEFAULT_PREFIX: &str = "terratest";

const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate a fresh identifier.
pub fn unique_id() -> String {
    let mut bits = Uuid::new_v4().as_u128();
    let mut id = String::with_capacity(ID_LEN);
    for _ in 0..ID_LEN {
        id.push(ALPHABET[(bits % 36) as usize] as char);
        bits /= 36;
    }
    id
}

/// `"{prefix}-{unique_id}"`.
pub fn namespaced(prefix: &str) -> String {
    format!("{}-{}", prefix, unique_id())
}
