//! Storage keys for processed videos: `{aspect}/{64 hex chars}.{ext}`.

use crate::models::media::AspectClass;
use rand::Rng;

/// Random bytes per key.
pub const KEY_ENTROPY_BYTES: usize = 32;

/// Build a fresh key under the aspect-class namespace.
///
/// `rand::rng()` is a ChaCha-based CSPRNG reseeded from the OS, so keys
/// cannot be enumerated from earlier ones. Collisions are not checked.
pub fn generate(aspect: AspectClass, extension: &str) -> String {
    let entropy: [u8; KEY_ENTROPY_BYTES] = rand::rng().random();
    format!("{}/{}.{}", aspect.as_str(), hex::encode(entropy), extension)
}
