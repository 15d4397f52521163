/*!
Computes the content-addressable fingerprint of a build command: a 128-bit
digest over the canonicalized CLI arguments and the build context's file set.

The digest width (32 hex characters) is the on-the-wire contract shared with
the cache-tag prefix; the specific hash function is not. This implementation
truncates SHA-256 (already a dependency via `buildsys`'s external-file
verification in `cache.rs`) to its first 16 bytes rather than reaching for a
dedicated 128-bit hash crate, since the corpus has no such crate in its
dependency set and the spec explicitly permits a stronger substitute as long
as the output stays 128 bits.
*/
use crate::context::BuildContext;
use sha2::{Digest, Sha256};

/// A 128-bit fingerprint, rendered as 32 lowercase hex characters.
pub type Fingerprint = String;

fn truncated_digest(bytes: &[u8]) -> u128 {
    let full = Sha256::digest(bytes);
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&full[..16]);
    u128::from_be_bytes(buf)
}

/// Hash a single file's relative path and contents into the per-file
/// digest that gets XOR-folded into the context accumulator. A NUL
/// separator keeps a file named `"ab"` with content `"c"` from colliding
/// with a file named `"a"` with content `"bc"`.
fn file_digest(rel_path: &str, content: &[u8]) -> u128 {
    let mut bytes = Vec::with_capacity(rel_path.len() + 1 + content.len());
    bytes.extend_from_slice(rel_path.as_bytes());
    bytes.push(0);
    bytes.extend_from_slice(content);
    truncated_digest(&bytes)
}

/// Fold every file in the context into a single order-independent
/// accumulator via XOR, exactly as specified: enumeration order must never
/// affect the result since directory traversal order varies by filesystem.
fn context_accumulator(context: &BuildContext) -> u128 {
    context
        .iter()
        .fold(0u128, |acc, (path, content)| acc ^ file_digest(path, content))
}

/// Compute the final fingerprint from the canonicalized command bytes and
/// the build context. `canonical_command` should already be in the stable
/// byte form produced by the command parser (see `crate::parse`).
pub fn fingerprint(canonical_command: &[u8], context: &BuildContext) -> Fingerprint {
    let accumulator = context_accumulator(context);

    let mut bytes = Vec::with_capacity(canonical_command.len() + 16);
    bytes.extend_from_slice(canonical_command);
    bytes.extend_from_slice(&accumulator.to_be_bytes());

    hex::encode(truncated_digest(&bytes).to_be_bytes())
}
