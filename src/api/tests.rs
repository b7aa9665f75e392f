#[cfg(test)]
mod tests {
    use crate::api::{OpKind, OpObserver, OpOutcome, Overlay, OverlayConfig, Protocol};
    use crate::error::Error;
    use crate::ident::{Ident, hash_key};
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    const NODES: [Ident; 4] = [100, 20_000, 40_000, 60_000];

    fn study_config() -> OverlayConfig {
        OverlayConfig {
            leaf_len: 4,
            ..OverlayConfig::default()
        }
    }

    fn both(records: &[(&str, Value)]) -> Vec<Overlay> {
        let records: Vec<(String, Value)> = records
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        [Protocol::Chord, Protocol::Pastry]
            .into_iter()
            .map(|protocol| {
                Overlay::build(protocol, &study_config(), &NODES, &records)
                    .expect("overlay should build")
            })
            .collect()
    }

    fn expected_owner(overlay: &Overlay, key: &str) -> Ident {
        let space = overlay.space();
        let key_id = hash_key(key, space);
        let mut ids = overlay.node_ids();
        ids.sort_unstable();
        match overlay.protocol() {
            Protocol::Chord => ids
                .iter()
                .copied()
                .find(|&id| id >= key_id)
                .unwrap_or(ids[0]),
            Protocol::Pastry => ids
                .iter()
                .copied()
                .min_by_key(|&id| (space.circular(id, key_id), id))
                .unwrap(),
        }
    }

    fn contents(overlay: &Overlay) -> BTreeMap<String, Vec<Value>> {
        let mut all = BTreeMap::new();
        for id in overlay.node_ids() {
            for (key, values) in overlay.items_of(id).unwrap() {
                all.entry(key).or_insert_with(Vec::new).extend(values);
            }
        }
        all
    }

    #[derive(Default)]
    struct Recorder {
        samples: Mutex<Vec<(Protocol, OpKind, u32, usize, usize)>>,
    }

    impl OpObserver for Recorder {
        fn record(&self, protocol: Protocol, op: OpKind, hops: u32, nodes: usize, items: usize) {
            self.samples.lock().push((protocol, op, hops, nodes, items));
        }
    }

    // ============================================================
    // PLACEMENT & ROUND TRIPS
    // ============================================================

    #[test]
    fn test_build_places_records_by_ownership_rule() {
        for overlay in both(&[("alpha", json!({ "id": 1 })), ("bravo", json!({ "id": 2 }))]) {
            for key in ["alpha", "bravo"] {
                let owner = expected_owner(&overlay, key);
                let holders: Vec<Ident> = overlay
                    .node_ids()
                    .into_iter()
                    .filter(|&id| {
                        overlay
                            .items_of(id)
                            .unwrap()
                            .iter()
                            .any(|(k, _)| k == key)
                    })
                    .collect();
                assert_eq!(
                    holders,
                    vec![owner],
                    "{}: {key} should live on its owner only",
                    overlay.protocol()
                );
            }
        }
    }

    #[test]
    fn test_every_key_lives_on_exactly_one_node() {
        for overlay in both(&[]) {
            for probe in 0..32 {
                overlay
                    .insert(&format!("movie {probe}"), json!({ "id": probe }), None)
                    .unwrap();
            }
            let mut holders: BTreeMap<String, usize> = BTreeMap::new();
            for id in overlay.node_ids() {
                for (key, _) in overlay.items_of(id).unwrap() {
                    *holders.entry(key).or_default() += 1;
                }
            }
            assert_eq!(holders.len(), 32);
            assert!(
                holders.values().all(|&count| count == 1),
                "{}: duplicated keys: {holders:?}",
                overlay.protocol()
            );
        }
    }

    #[test]
    fn test_lookup_from_remote_node_roundtrips() {
        for overlay in both(&[("alpha", json!({ "id": 1 }))]) {
            let report = overlay.lookup("alpha", Some(60_000)).unwrap();
            assert_eq!(
                report.outcome,
                OpOutcome::Values(Some(vec![json!({ "id": 1 })]))
            );
            assert!(
                (1..=4).contains(&report.hops),
                "{}: {} hops on a 4-node overlay",
                overlay.protocol(),
                report.hops
            );
            assert_eq!(report.owner, expected_owner(&overlay, "alpha"));
        }
    }

    #[test]
    fn test_update_leaves_single_value() {
        for overlay in both(&[("alpha", json!({ "id": 1 }))]) {
            overlay.insert("alpha", json!({ "id": 2 }), None).unwrap();

            let report = overlay.update("alpha", json!({ "id": 9 }), None).unwrap();
            assert_eq!(report.outcome, OpOutcome::Applied(true));

            let report = overlay.lookup("alpha", None).unwrap();
            assert_eq!(
                report.outcome,
                OpOutcome::Values(Some(vec![json!({ "id": 9 })])),
                "{}: update must collapse the value list",
                overlay.protocol()
            );
        }
    }

    #[test]
    fn test_delete_of_absent_key_costs_one_resolution() {
        for overlay in both(&[("alpha", json!({ "id": 1 }))]) {
            let first = overlay.delete("charlie", Some(60_000)).unwrap();
            let second = overlay.delete("charlie", Some(60_000)).unwrap();

            assert_eq!(first.outcome, OpOutcome::Applied(false));
            assert_eq!(second.outcome, OpOutcome::Applied(false));
            assert_eq!(
                first.hops, second.hops,
                "{}: a miss costs exactly the resolution",
                overlay.protocol()
            );
            assert_eq!(contents(&overlay).len(), 1, "nothing may be disturbed");
        }
    }

    // ============================================================
    // MEMBERSHIP SCENARIOS
    // ============================================================

    #[test]
    fn test_join_then_leave_tracks_ownership() {
        for protocol in [Protocol::Chord, Protocol::Pastry] {
            let records = vec![
                ("alpha".to_string(), json!({ "id": 1 })),
                ("bravo".to_string(), json!({ "id": 2 })),
            ];
            let mut overlay =
                Overlay::build(protocol, &study_config(), &NODES, &records).unwrap();
            let before = contents(&overlay);

            overlay.join(30_000).unwrap();
            assert!(overlay.contains(30_000));
            assert_eq!(contents(&overlay), before, "{protocol}: join must conserve keys");

            let report = overlay.lookup("alpha", None).unwrap();
            assert_eq!(report.outcome, OpOutcome::Values(Some(vec![json!({ "id": 1 })])));
            assert_eq!(report.owner, expected_owner(&overlay, "alpha"));

            overlay.leave(20_000).unwrap();
            assert!(!overlay.contains(20_000));
            assert_eq!(contents(&overlay), before, "{protocol}: leave must conserve keys");

            let owner = expected_owner(&overlay, "alpha");
            let report = overlay.lookup("alpha", None).unwrap();
            assert_eq!(report.owner, owner);
            assert!(
                overlay
                    .items_of(owner)
                    .unwrap()
                    .iter()
                    .any(|(k, _)| k == "alpha"),
                "{protocol}: alpha should live on {owner}"
            );
        }
    }

    #[test]
    fn test_membership_failures_leave_overlay_unchanged() {
        for protocol in [Protocol::Chord, Protocol::Pastry] {
            let mut overlay =
                Overlay::build(protocol, &study_config(), &NODES, &[]).unwrap();

            assert_eq!(overlay.join(20_000).unwrap_err(), Error::DuplicateId(20_000));
            assert_eq!(overlay.leave(777).unwrap_err(), Error::UnknownNode(777));
            assert_eq!(overlay.node_ids(), NODES.to_vec());

            let mut lonely =
                Overlay::build(protocol, &study_config(), &[4242], &[]).unwrap();
            assert_eq!(lonely.leave(4242).unwrap_err(), Error::EmptyOverlayForbidden);
        }
    }

    #[test]
    fn test_both_protocols_see_the_same_node_set() {
        let overlays = both(&[]);
        assert_eq!(overlays[0].node_ids(), overlays[1].node_ids());
    }

    // ============================================================
    // OBSERVER & CONFIG
    // ============================================================

    #[test]
    fn test_observer_sees_every_completed_operation() {
        let mut overlay =
            Overlay::build(Protocol::Chord, &study_config(), &NODES, &[]).unwrap();
        let recorder = Arc::new(Recorder::default());
        overlay.set_observer(recorder.clone());

        let report = overlay.insert("alpha", json!({ "id": 1 }), None).unwrap();
        overlay.lookup("alpha", None).unwrap();
        overlay.delete("alpha", None).unwrap();
        overlay.join(30_000).unwrap();
        overlay.leave(30_000).unwrap();

        let samples = recorder.samples.lock();
        let kinds: Vec<OpKind> = samples.iter().map(|s| s.1).collect();
        assert_eq!(
            kinds,
            vec![OpKind::Insert, OpKind::Lookup, OpKind::Delete, OpKind::Join, OpKind::Leave]
        );
        assert!(samples.iter().all(|s| s.0 == Protocol::Chord));
        assert_eq!(samples[0].2, report.hops, "observer hops must match the report");
        assert_eq!(samples[0].3, 4, "node count at insert time");
        assert_eq!(samples[0].4, 1, "item count after the insert");
        assert_eq!(samples[3].3, 5, "node count after the join");
    }

    #[test]
    fn test_config_validation() {
        let bad_bits = OverlayConfig { bits: 4, ..OverlayConfig::default() };
        assert!(matches!(
            Overlay::chord(&bad_bits, &NODES),
            Err(Error::InvalidConfig(_))
        ));

        let odd_leaves = OverlayConfig { leaf_len: 5, ..OverlayConfig::default() };
        assert!(matches!(
            Overlay::pastry(&odd_leaves, &NODES),
            Err(Error::InvalidConfig(_))
        ));

        let thin_tree = OverlayConfig { branching: 2, ..OverlayConfig::default() };
        assert!(matches!(
            Overlay::chord(&thin_tree, &NODES),
            Err(Error::InvalidConfig(_))
        ));

        let wide_digits = OverlayConfig { digit_bits: 9, ..OverlayConfig::default() };
        assert!(matches!(
            Overlay::pastry(&wide_digits, &NODES),
            Err(Error::InvalidConfig(_))
        ));
    }
}
