use calvault_types::ObjectId;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation, so an object-store hash can never collide with a hash taken
/// for some other purpose over the same bytes.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for content blobs in the object store.
    pub const OBJECT: Self = Self {
        domain: "calvault-object-v1",
    };

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> ObjectId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        ObjectId::from_hash(*hasher.finalize().as_bytes())
    }

    /// Verify that data produces the expected object ID.
    pub fn verify(&self, data: &[u8], expected: &ObjectId) -> bool {
        self.hash(data) == *expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let data = b"hello world";
        assert_eq!(ContentHasher::OBJECT.hash(data), ContentHasher::OBJECT.hash(data));
    }

    #[test]
    fn domain_tag_is_part_of_the_hash() {
        let plain = ObjectId::from_hash(*blake3::hash(b"same").as_bytes());
        assert_ne!(ContentHasher::OBJECT.hash(b"same"), plain);
    }

    #[test]
    fn verify_correct_and_tampered_data() {
        let id = ContentHasher::OBJECT.hash(b"original");
        assert!(ContentHasher::OBJECT.verify(b"original", &id));
        assert!(!ContentHasher::OBJECT.verify(b"tampered", &id));
    }

    #[test]
    fn canonical_bytes_hash_the_same_in_any_field_order() {
        let a = serde_json::json!({"summary": "X", "icon": "a.png"});
        let b = serde_json::json!({"icon": "a.png", "summary": "X"});
        assert_eq!(
            ContentHasher::OBJECT.hash(&crate::canonical::encode_value(&a).unwrap()),
            ContentHasher::OBJECT.hash(&crate::canonical::encode_value(&b).unwrap())
        );
    }
}
