use sha2::{Digest, Sha256};

/// Hash of normalized page text, used for the Explorer's near-duplicate
/// gate and for detecting unchanged content on refetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
    pub fn compute(content: &str) -> Self {
        let normalized = normalize_content(content);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trims each line and drops blank lines before hashing, so that
/// whitespace-only refetch noise never registers as a content change.
fn normalize_content(content: &str) -> String {
    content
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_only_changes_do_not_change_hash() {
        let a = ContentHash::compute("Hello world\nSecond line");
        let b = ContentHash::compute("  Hello world  \n\n  Second line  \n\n");
        assert_eq!(a, b);
    }

    #[test]
    fn different_content_hashes_differ() {
        let a = ContentHash::compute("Hello world");
        let b = ContentHash::compute("Goodbye world");
        assert_ne!(a, b);
    }
}
