//! Cache key helpers.

use kiln_core::{CacheKey, Result};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Fingerprint a set of input files.
///
/// Each file contributes its path and contents so that renames change the
/// fingerprint too. Directories are walked in sorted order.
pub fn fingerprint(inputs: &[&Path]) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut sorted: Vec<&Path> = inputs.to_vec();
    sorted.sort();
    for path in sorted {
        hash_path(&mut hasher, path)?;
    }
    Ok(hex::encode(hasher.finalize()))
}

fn hash_path(hasher: &mut Sha256, path: &Path) -> Result<()> {
    if path.is_dir() {
        let mut children = std::fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        children.sort();
        for child in children {
            hash_path(hasher, &child)?;
        }
    } else {
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(std::fs::read(path)?);
    }
    Ok(())
}

/// Build a key whose hash fingerprints the given inputs.
pub fn key_for_inputs(id: &str, inputs: &[&Path]) -> Result<CacheKey> {
    Ok(CacheKey::new(id, fingerprint(inputs)?))
}

/// Encode a key component as a single file name.
///
/// Separators, characters reserved on common filesystems and `%` itself are
/// written as `%XX`, as is a leading `.`, so distinct components always give
/// distinct names and no component can name `.`, `..` or a hidden temp file.
/// The empty component encodes as a lone `%`.
pub fn encode_component(component: &str) -> String {
    if component.is_empty() {
        return "%".to_string();
    }
    let mut encoded = String::with_capacity(component.len());
    for (i, c) in component.char_indices() {
        let reserved = matches!(
            c,
            '%' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'
        ) || c.is_ascii_control()
            || (i == 0 && c == '.');
        if reserved {
            encoded.push_str(&format!("%{:02X}", c as u32));
        } else {
            encoded.push(c);
        }
    }
    encoded
}
