use kube::{Resource, ResourceExt};
use serde::Serialize;
use sha2::{Digest, Sha256};
use snafu::ResultExt;

use super::{Result, SerializeHashInputSnafu};
use crate::labels::{HASH_LABEL_KEY, INDEX_LABEL_KEY};

/// Computes the hash label value `<namespace>.<hash(selector)>.<hash(content)>`.
///
/// `selector` and `content` are hashed over their JSON serialization, so
/// callers must pass canonical (sorted, deduplicated) values to get set
/// semantics.
pub fn compute_hash<S, C>(namespace: &str, selector: &S, content: &C) -> Result<String>
where
    S: Serialize + ?Sized,
    C: Serialize + ?Sized,
{
    Ok(format!(
        "{namespace}.{selector}.{content}",
        selector = digest(selector)?,
        content = digest(content)?
    ))
}

/// Hex encoded prefix of the SHA-256 digest. Keeps the label value within
/// the 63 character limit for reasonable namespace lengths.
fn digest<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let bytes = serde_json::to_vec(value).context(SerializeHashInputSnafu)?;
    let digest = Sha256::digest(&bytes);
    let prefix = digest
        .as_slice()
        .first_chunk::<4>()
        .map_or(0, |chunk| u32::from_be_bytes(*chunk));

    Ok(format!("{prefix:08x}"))
}

/// Objects whose identity can be derived from their content.
pub trait ContentHash: Resource + Sized {
    /// The value of the hash label for this object.
    fn content_hash(&self) -> Result<String>;

    /// Writes the hash and index labels. Must be called before the object is
    /// added to a [`Desired`][super::Desired] state.
    fn add_hashing_labels(&mut self, index: usize) -> Result<()> {
        let hash = self.content_hash()?;
        let labels = self.labels_mut();
        labels.insert(HASH_LABEL_KEY.to_owned(), hash);
        labels.insert(INDEX_LABEL_KEY.to_owned(), index.to_string());

        Ok(())
    }
}
