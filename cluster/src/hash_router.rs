use crate::config::{HASH_KEY_LEN, Membership};
use siphasher::sip::SipHasher24;
use std::hash::Hasher;

/// SipHash-2-4 of the raw name bytes, keyed with the cluster hash key.
///
/// Hashing the bytes directly (rather than through `Hash for str`, which adds a
/// terminator) keeps the value identical to any other SipHash-2-4 implementation
/// fed the same key and name.
pub fn hash_resource(key: &[u8; HASH_KEY_LEN], name: &str) -> u64 {
    let mut hasher = SipHasher24::new_with_key(key);
    hasher.write(name.as_bytes());
    hasher.finish()
}

/// Picks the member that owns `name`.
///
/// Every process configured with the same key and the same ordered member list
/// maps a name to the same member. Returns `None` only for an empty member list.
pub fn select_owner<'a>(name: &str, membership: &'a Membership) -> Option<&'a str> {
    let members = membership.members();
    if members.is_empty() {
        return None;
    }

    let hash = hash_resource(membership.hash_key(), name);
    let index = (hash % members.len() as u64) as usize;
    members.get(index).map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterConfig;

    fn membership(members: &[&str]) -> Membership {
        let config = ClusterConfig {
            members: members.iter().map(|m| m.to_string()).collect(),
            hash_key: "loremipsumdolors".into(),
            shared_storage: false,
            shared_cache: false,
            timeout_secs: None,
            tls: None,
        };
        Membership::from_config(Some(&config)).unwrap()
    }

    #[test]
    fn test_reference_vector() {
        // SipHash-2-4 reference vector: key 00..0f, message 00..0e.
        let key: [u8; 16] = std::array::from_fn(|i| i as u8);
        let mut hasher = SipHasher24::new_with_key(&key);
        hasher.write(&(0u8..15).collect::<Vec<_>>());
        assert_eq!(hasher.finish(), 0xa129ca6149be45e5);
    }

    #[test]
    fn test_hash_resource_values() {
        let key = b"loremipsumdolors";
        assert_eq!(hash_resource(key, "alpine"), 16892849003881565083);
        assert_eq!(hash_resource(key, "zot"), 10257815497900937267);
        assert_eq!(hash_resource(key, "busybox"), 17305906831562717424);
    }

    #[test]
    fn test_select_owner() {
        let members = membership(&["a:5000", "b:5000", "c:5000"]);

        assert_eq!(select_owner("busybox", &members), Some("a:5000"));
        assert_eq!(select_owner("alpine", &members), Some("b:5000"));
        assert_eq!(select_owner("zot", &members), Some("c:5000"));

        let members = membership(&["a:5000", "b:5000"]);
        assert_eq!(select_owner("ubuntu", &members), Some("a:5000"));
        assert_eq!(select_owner("debian", &members), Some("b:5000"));
    }

    #[test]
    fn test_select_owner_is_deterministic() {
        let first = membership(&["a:5000", "b:5000", "c:5000"]);
        let second = membership(&["a:5000", "b:5000", "c:5000"]);

        for name in ["alpine", "library/nginx", "app/backend", "x"] {
            let owner = select_owner(name, &first);
            assert_eq!(owner, select_owner(name, &first));
            assert_eq!(owner, select_owner(name, &second));
        }
    }

    #[test]
    fn test_select_owner_without_members() {
        assert_eq!(select_owner("alpine", &Membership::disabled()), None);
    }
}
