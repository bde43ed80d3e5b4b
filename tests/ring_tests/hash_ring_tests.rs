//! Hash Ring Tests
//!
//! Ownership, ranges and successors on the consistent-hash ring.

use ringkv::ring::{ring_hash, HashRing, KeyRange, RingNode, RingPosition};
use ringkv::RingKvError;

fn node(port: u16) -> RingNode {
    RingNode::new("127.0.0.1", port)
}

fn ring_of(ports: &[u16]) -> HashRing {
    HashRing::from_nodes(ports.iter().map(|&p| node(p))).unwrap()
}

fn keys(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("key-{}", i)).collect()
}

/// Small deterministic generator so property runs are repeatable
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

// =============================================================================
// Hashing
// =============================================================================

#[test]
fn test_hash_is_md5_big_endian() {
    // md5("") = d41d8cd98f00b204e9800998ecf8427e
    assert_eq!(
        ring_hash(""),
        RingPosition(0xd41d8cd98f00b204e9800998ecf8427e)
    );
    assert_eq!(ring_hash("").to_string(), "d41d8cd98f00b204e9800998ecf8427e");
}

#[test]
fn test_position_hex_roundtrip() {
    let position = ring_hash("127.0.0.1:5000");
    assert_eq!(RingPosition::from_hex(&position.to_string()), Some(position));
}

// =============================================================================
// Ownership
// =============================================================================

#[test]
fn test_empty_ring_has_no_owner() {
    let ring = HashRing::new();
    assert!(matches!(ring.owner_of("k"), Err(RingKvError::EmptyRing)));
}

#[test]
fn test_single_node_owns_everything() {
    let ring = ring_of(&[5000]);
    for key in keys(100) {
        assert_eq!(ring.owner_of(&key).unwrap().name, "127.0.0.1:5000");
    }

    let range = ring.range_of("127.0.0.1:5000").unwrap();
    assert!(range.wraps());
    assert!(range.contains(RingPosition(0)));
    assert!(range.contains(RingPosition(u128::MAX)));
}

#[test]
fn test_owner_is_first_position_at_or_after_key() {
    let ring = ring_of(&[5000, 5001, 5002, 5003]);
    let mut positions: Vec<RingPosition> = ring.nodes().map(|n| n.position()).collect();
    positions.sort();

    for key in keys(200) {
        let hash = ring_hash(&key);
        let expected = positions
            .iter()
            .find(|p| **p >= hash)
            .copied()
            .unwrap_or(positions[0]);
        assert_eq!(ring.owner_of(&key).unwrap().position(), expected);
    }
}

#[test]
fn test_node_position_owns_itself() {
    let ring = ring_of(&[5000, 5001, 5002]);
    for n in ring.nodes() {
        assert_eq!(ring.owner_of_position(n.position()).unwrap().name, n.name);
    }
}

#[test]
fn test_ranges_partition_the_ring() {
    let ring = ring_of(&[5000, 5001, 5002, 5003, 5004]);
    let ranges = ring.key_ranges();
    assert_eq!(ranges.len(), 5);

    for key in keys(500) {
        let owners: Vec<&RingNode> = ranges
            .iter()
            .filter(|(range, _)| range.contains_key(&key))
            .map(|(_, n)| n)
            .collect();
        assert_eq!(owners.len(), 1, "key {} owned {} times", key, owners.len());
        assert_eq!(owners[0], ring.owner_of(&key).unwrap());
    }
}

#[test]
fn test_exactly_one_range_wraps() {
    let ring = ring_of(&[5000, 5001, 5002, 5003]);
    let wrapping = ring.key_ranges().iter().filter(|(r, _)| r.wraps()).count();
    assert_eq!(wrapping, 1);
}

#[test]
fn test_same_membership_same_ring_regardless_of_order() {
    let a = ring_of(&[5000, 5001, 5002, 5003]);
    let b = ring_of(&[5003, 5001, 5000, 5002]);

    for key in keys(300) {
        assert_eq!(a.owner_of(&key).unwrap(), b.owner_of(&key).unwrap());
    }
    assert_eq!(a.snapshot(), b.snapshot());
}

// =============================================================================
// Membership Changes
// =============================================================================

#[test]
fn test_adding_a_node_moves_only_its_range() {
    let before = ring_of(&[5000, 5001, 5002]);
    let after = ring_of(&[5000, 5001, 5002, 5003]);
    let newcomer = "127.0.0.1:5003";
    let range = after.range_of(newcomer).unwrap();

    for key in keys(500) {
        let old = before.owner_of(&key).unwrap();
        let new = after.owner_of(&key).unwrap();
        if new.name == newcomer {
            assert!(range.contains_key(&key));
        } else {
            assert_eq!(old, new, "key {} moved without reason", key);
        }
    }
}

#[test]
fn test_partition_holds_through_random_membership_changes() {
    let mut rng = Lcg(42);
    let mut ring = HashRing::new();
    let sample = keys(200);

    for step in 0..300 {
        let port = 5000 + (rng.next() % 24) as u16;
        let name = format!("127.0.0.1:{}", port);
        if ring.contains(&name) {
            ring.remove(&name).unwrap();
        } else {
            ring.place(node(port)).unwrap();
        }

        let ranges = ring.key_ranges();
        assert_eq!(ranges.len(), ring.len(), "step {}", step);
        if ring.is_empty() {
            assert!(matches!(ring.owner_of("k"), Err(RingKvError::EmptyRing)));
            continue;
        }

        assert_eq!(
            ranges.iter().filter(|(r, _)| r.wraps()).count(),
            1,
            "step {}",
            step
        );
        for i in 0..ranges.len() {
            let previous = &ranges[(i + ranges.len() - 1) % ranges.len()].0;
            assert_eq!(ranges[i].0.low_exclusive, previous.high_inclusive, "step {}", step);
        }

        for key in &sample {
            let owners: Vec<&RingNode> = ranges
                .iter()
                .filter(|(range, _)| range.contains_key(key))
                .map(|(_, n)| n)
                .collect();
            assert_eq!(owners.len(), 1, "step {}: key {} owned {} times", step, key, owners.len());
            assert_eq!(owners[0], ring.owner_of(key).unwrap());
        }
    }
}

#[test]
fn test_removed_range_goes_to_successor() {
    let ring = ring_of(&[5000, 5001, 5002, 5003]);
    let leaving = "127.0.0.1:5001";
    let successor = ring.successor_of(leaving).unwrap().unwrap().clone();
    let range = ring.range_of(leaving).unwrap();

    let mut smaller = ring.clone();
    smaller.remove(leaving).unwrap();

    for key in keys(500) {
        if range.contains_key(&key) {
            assert_eq!(smaller.owner_of(&key).unwrap(), &successor);
        } else {
            assert_eq!(smaller.owner_of(&key).unwrap(), ring.owner_of(&key).unwrap());
        }
    }
}

#[test]
fn test_successor_wraps_and_is_none_when_alone() {
    let single = ring_of(&[5000]);
    assert!(single.successor_of("127.0.0.1:5000").unwrap().is_none());

    let ring = ring_of(&[5000, 5001, 5002]);
    let ordered: Vec<&RingNode> = ring.nodes().collect();
    let last = ordered[ordered.len() - 1];
    assert_eq!(ring.successor_of(&last.name).unwrap().unwrap(), ordered[0]);
}

#[test]
fn test_place_rejects_occupied_position() {
    let mut ring = ring_of(&[5000]);
    let err = ring.place(node(5000)).unwrap_err();
    assert!(matches!(err, RingKvError::RingCollision { .. }));
    assert_eq!(ring.len(), 1);
}

#[test]
fn test_remove_unknown_node_fails() {
    let mut ring = ring_of(&[5000]);
    assert!(matches!(
        ring.remove("127.0.0.1:9"),
        Err(RingKvError::NodeNotFound(_))
    ));
    assert!(matches!(
        ring.range_of("127.0.0.1:9"),
        Err(RingKvError::NodeNotFound(_))
    ));
}

#[test]
fn test_node_identity_parsing() {
    let n = RingNode::parse("localhost:5000").unwrap();
    assert_eq!(n.host, "localhost");
    assert_eq!(n.port, 5000);
    assert_eq!(n.name, "localhost:5000");
    assert!(RingNode::parse("no-port").is_err());
    assert!(RingNode::parse("host:99999").is_err());
}

#[test]
fn test_range_display_is_low_high() {
    let range = KeyRange::new(RingPosition(1), RingPosition(255));
    assert_eq!(
        range.to_string(),
        format!("{:032x},{:032x}", 1u128, 255u128)
    );
    assert!(!range.wraps());
    assert!(!range.contains(RingPosition(1)));
    assert!(range.contains(RingPosition(255)));
}
