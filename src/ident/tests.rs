#[cfg(test)]
mod tests {
    use crate::ident::{IdSpace, derived_node_ids, hash_key, normalize_title};

    // ============================================================
    // DISTANCE TESTS
    // ============================================================

    #[test]
    fn test_clockwise_distance_wraps() {
        let space = IdSpace::new(16);

        assert_eq!(space.clockwise(100, 300), 200);
        assert_eq!(space.clockwise(300, 100), 65_336, "distance should wrap past zero");
        assert_eq!(space.clockwise(42, 42), 0);
    }

    #[test]
    fn test_circular_distance_is_symmetric() {
        let space = IdSpace::new(16);

        assert_eq!(space.circular(0, 65_535), 1);
        assert_eq!(space.circular(65_535, 0), 1);
        assert_eq!(space.circular(0, 32_768), 32_768);
    }

    #[test]
    fn test_interval_membership() {
        let space = IdSpace::new(16);

        // Plain interval
        assert!(space.in_open(200, 100, 300));
        assert!(!space.in_open(100, 100, 300));
        assert!(!space.in_open(300, 100, 300));
        assert!(space.in_open_closed(300, 100, 300));

        // Wrapping interval
        assert!(space.in_open_closed(10, 60_000, 100));
        assert!(space.in_open_closed(65_000, 60_000, 100));
        assert!(!space.in_open_closed(30_000, 60_000, 100));

        // Degenerate interval: open is empty, half-open covers the ring
        assert!(!space.in_open(5, 42, 42));
        assert!(space.in_open_closed(5, 42, 42));
        assert!(space.in_closed(5, 42, 42));
    }

    // ============================================================
    // DIGIT TESTS
    // ============================================================

    #[test]
    fn test_digit_decomposition() {
        let space = IdSpace::new(16);

        // 0xABCD in base 16, most significant digit first
        let id = 0xABCD;
        assert_eq!(space.digit_count(4), 4);
        assert_eq!(space.digit(id, 0, 4), 0xA);
        assert_eq!(space.digit(id, 1, 4), 0xB);
        assert_eq!(space.digit(id, 2, 4), 0xC);
        assert_eq!(space.digit(id, 3, 4), 0xD);
    }

    #[test]
    fn test_digit_with_ragged_last_row() {
        // m=10, b=4: two full digits plus a 2-bit tail digit
        let space = IdSpace::new(10);
        assert_eq!(space.digit_count(4), 3);

        let id = 0b10_1100_0111;
        assert_eq!(space.digit(id, 0, 4), 0b1011);
        assert_eq!(space.digit(id, 1, 4), 0b0001);
        assert_eq!(space.digit(id, 2, 4), 0b11);
    }

    #[test]
    fn test_shared_prefix_length() {
        let space = IdSpace::new(16);

        assert_eq!(space.shared_prefix(0xABCD, 0xABCE, 4), 3);
        assert_eq!(space.shared_prefix(0xABCD, 0xAB00, 4), 2);
        assert_eq!(space.shared_prefix(0xABCD, 0x1BCD, 4), 0);
        assert_eq!(space.shared_prefix(0xABCD, 0xABCD, 4), 4);
    }

    // ============================================================
    // HASHING TESTS
    // ============================================================

    #[test]
    fn test_hash_key_is_deterministic() {
        let space = IdSpace::new(16);

        let h1 = hash_key("the godfather", space);
        let h2 = hash_key("the godfather", space);
        assert_eq!(h1, h2);
        assert!(h1 <= space.mask());
    }

    #[test]
    fn test_hash_key_respects_bit_width() {
        for bits in [8, 16, 24, 48] {
            let space = IdSpace::new(bits);
            for i in 0..200 {
                let id = hash_key(&format!("movie {i}"), space);
                assert!(id <= space.mask(), "id {id} exceeds {bits}-bit space");
            }
        }
    }

    #[test]
    fn test_hash_key_spreads_over_space() {
        let space = IdSpace::new(16);

        let mut seen = std::collections::HashSet::new();
        for i in 0..500 {
            seen.insert(hash_key(&format!("movie {i}"), space));
        }
        assert!(seen.len() > 480, "500 titles should rarely collide in a 16-bit space");
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("  The Godfather  "), "the godfather");
        assert_eq!(normalize_title("ALIEN"), "alien");
        assert_eq!(normalize_title("heat"), "heat");
    }

    #[test]
    fn test_derived_node_ids_are_distinct() {
        let space = IdSpace::new(16);

        let ids = derived_node_ids(128, space);
        let unique: std::collections::HashSet<_> = ids.iter().copied().collect();
        assert_eq!(unique.len(), 128);
        assert!(ids.iter().all(|id| *id <= space.mask()));
    }
}
