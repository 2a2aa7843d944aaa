//! Integration tests for the topology cache stores

use nrt_cache::{
    Container, Counter, FingerprintReconciler, NodeWorkloadIndex, NrtStore, Quantity,
    ResourceInfo, ResourceStore, TopologySnapshot, Workload, Zone, FINGERPRINT_ANNOTATION,
    RESOURCE_CPU, RESOURCE_MEMORY, ZONE_TYPE_NODE,
};
use std::sync::Arc;

const NIC_NAME: &str = "vendor_A.com/nic";

fn q(s: &str) -> Quantity {
    Quantity::parse(s).unwrap()
}

fn policy_snapshot(node: &str, policy: &str) -> TopologySnapshot {
    let mut snapshot = TopologySnapshot::new(node);
    snapshot.topology_policies.push(policy.to_string());
    snapshot
}

fn res_info(name: &str, capacity: &str, available: &str) -> ResourceInfo {
    ResourceInfo::new(name, q(capacity), q(available))
}

fn find_resource<'a>(zone: &'a Zone, name: &str) -> Option<&'a ResourceInfo> {
    zone.resources.iter().find(|r| r.name == name)
}

fn single_container_pod() -> Workload {
    Workload::new("ns-0", "pod-0").with_container(
        Container::new("cnt-0")
            .with_request(RESOURCE_CPU, q("16"))
            .with_request(RESOURCE_MEMORY, q("4Gi")),
    )
}

mod nrt_store {
    use super::*;

    #[test]
    fn test_get_returns_independent_copies() {
        let mut nrts = vec![
            policy_snapshot("node-0", "best-effort"),
            policy_snapshot("node-1", "restricted"),
        ];
        let store = NrtStore::new(&nrts);

        let mut obj = store.get_copy_by_node_name("node-0").unwrap();
        obj.topology_policies[0] = "single-numa-node".to_string();

        let obj2 = store.get_copy_by_node_name("node-0").unwrap();
        assert_eq!(
            obj2.topology_policies[0], nrts[0].topology_policies[0],
            "change to local copy propagated back in the store"
        );

        nrts[0].topology_policies[0] = "single-numa-node".to_string();
        let obj3 = store.get_copy_by_node_name("node-0").unwrap();
        assert_eq!(
            obj3.topology_policies[0], "best-effort",
            "stored value is not an independent copy"
        );
    }

    #[test]
    fn test_update_inserts_unknown_node_as_copy() {
        let store = NrtStore::new(&[
            policy_snapshot("node-0", "best-effort"),
            policy_snapshot("node-1", "restricted"),
        ]);

        let mut nrt3 = policy_snapshot("node-2", "none");
        store.update(&nrt3);
        nrt3.topology_policies[0] = "best-effort".to_string();

        let obj3 = store.get_copy_by_node_name("node-2").unwrap();
        assert_eq!(
            obj3.topology_policies[0], "none",
            "stored value is not an independent copy"
        );
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_copy_taken_before_update_is_unaffected() {
        let store = NrtStore::new(&[policy_snapshot("node-0", "best-effort")]);
        let before = store.get_copy_by_node_name("node-0").unwrap();

        store.update(&policy_snapshot("node-0", "restricted"));

        assert_eq!(before.topology_policies[0], "best-effort");
        let after = store.get_copy_by_node_name("node-0").unwrap();
        assert_eq!(after.topology_policies[0], "restricted");
    }

    #[test]
    fn test_get_missing() {
        let store = NrtStore::new(&[]);
        assert!(
            store.get_copy_by_node_name("node-missing").is_none(),
            "missing node returned data"
        );
    }
}

mod counter {
    use super::*;

    #[test]
    fn test_incr() {
        let cnt = Counter::new();
        assert!(!cnt.is_set("missing"), "found nonexisting key in empty counter");

        cnt.incr("aaa");
        cnt.incr("aaa");
        assert_eq!(cnt.incr("aaa"), 3);
        cnt.incr("bbb");

        assert!(cnt.is_set("aaa"));
        assert!(cnt.is_set("bbb"));
    }

    #[test]
    fn test_delete() {
        let cnt = Counter::new();
        cnt.incr("aaa");
        cnt.incr("aaa");
        cnt.incr("bbb");

        cnt.delete("aaa");
        assert!(!cnt.is_set("aaa"));
        assert!(cnt.is_set("bbb"));
    }

    #[test]
    fn test_keys() {
        let cnt = Counter::new();
        for key in ["a", "b", "c", "b", "a", "c"] {
            cnt.incr(key);
        }

        let mut keys = cnt.keys();
        keys.sort();
        assert_eq!(keys, vec!["a", "b", "c"]);

        cnt.delete("b");
        let mut keys = cnt.keys();
        keys.sort();
        assert_eq!(keys, vec!["a", "c"]);
    }
}

mod resource_store {
    use super::*;

    #[test]
    fn test_add_pod() {
        let pod = single_container_pod();
        let rs = ResourceStore::new();

        assert!(!rs.add_workload("node", &pod), "replaced a pod into an empty store");
        assert!(rs.add_workload("node", &pod), "added pod twice without noticing");
    }

    #[test]
    fn test_delete_pod() {
        let pod = single_container_pod();
        let rs = ResourceStore::new();

        assert!(!rs.delete_workload("node", &pod), "deleted a pod from an empty store");
        rs.add_workload("node", &pod);
        assert!(rs.delete_workload("node", &pod), "pod was not present");
        assert!(!rs.delete_workload("node", &pod));
    }

    #[test]
    fn test_overlay_two_zone_scenario() {
        let mut nrt = TopologySnapshot::new("node");
        nrt.topology_policies.push("single-numa-node-pod-level".to_string());
        nrt.zones = vec![
            Zone {
                name: "node-0".to_string(),
                zone_type: ZONE_TYPE_NODE.to_string(),
                resources: vec![
                    res_info(RESOURCE_CPU, "20", "20"),
                    res_info(RESOURCE_MEMORY, "32Gi", "32Gi"),
                ],
            },
            Zone {
                name: "node-1".to_string(),
                zone_type: ZONE_TYPE_NODE.to_string(),
                resources: vec![
                    res_info(RESOURCE_CPU, "20", "20"),
                    res_info(RESOURCE_MEMORY, "32Gi", "32Gi"),
                    res_info(NIC_NAME, "8", "8"),
                ],
            },
        ];

        let pod = Workload::new("ns-0", "pod-0")
            .with_container(
                Container::new("cnt-0")
                    .with_request(RESOURCE_CPU, q("16"))
                    .with_request(RESOURCE_MEMORY, q("4Gi"))
                    .with_request(NIC_NAME, q("2")),
            )
            .with_container(
                Container::new("cnt-1")
                    .with_request(RESOURCE_CPU, q("2"))
                    .with_request(RESOURCE_MEMORY, q("2Gi")),
            );

        let rs = ResourceStore::new();
        assert!(!rs.add_workload("node", &pod));

        let anomalies = rs.apply_overlay("testResourceStoreUpdate", &mut nrt);
        assert!(anomalies.is_empty());

        for (idx, zone) in nrt.zones.iter().enumerate() {
            let cpu = find_resource(zone, RESOURCE_CPU).unwrap();
            assert_eq!(cpu.capacity, q("20"), "bad cpu capacity on zone {idx}");
            assert_eq!(cpu.available, q("2"), "bad cpu availability on zone {idx}");

            let mem = find_resource(zone, RESOURCE_MEMORY).unwrap();
            assert_eq!(mem.capacity, q("32Gi"), "bad memory capacity on zone {idx}");
            assert_eq!(mem.available, q("26Gi"), "bad memory availability on zone {idx}");
        }

        assert!(
            find_resource(&nrt.zones[0], NIC_NAME).is_none(),
            "unexpected device on zone 0"
        );
        let dev = find_resource(&nrt.zones[1], NIC_NAME).expect("device missing on zone 1");
        assert_eq!(dev.capacity, q("8"));
        assert_eq!(dev.available, q("6"));
    }

    #[test]
    fn test_overlay_on_store_copy_leaves_store_untouched() {
        let mut report = TopologySnapshot::new("node");
        report.zones.push(Zone {
            name: "node-0".to_string(),
            zone_type: ZONE_TYPE_NODE.to_string(),
            resources: vec![res_info(RESOURCE_CPU, "20", "20")],
        });
        let store = NrtStore::new(&[report]);
        let rs = ResourceStore::new();
        rs.add_workload("node", &single_container_pod());

        let mut view = store.get_copy_by_node_name("node").unwrap();
        rs.apply_overlay("test", &mut view);
        assert_eq!(find_resource(&view.zones[0], RESOURCE_CPU).unwrap().available, q("4"));

        let pristine = store.get_copy_by_node_name("node").unwrap();
        assert_eq!(
            find_resource(&pristine.zones[0], RESOURCE_CPU).unwrap().available,
            q("20")
        );
    }
}

mod fingerprint {
    use super::*;

    #[test]
    fn test_fingerprint_from_snapshot() {
        let index = Arc::new(NodeWorkloadIndex::new());
        let reconciler = FingerprintReconciler::new(index);

        let mut nrt = policy_snapshot("node-0", "best-effort");
        assert_eq!(reconciler.extract_token(&nrt), None, "missing annotations");

        nrt.annotations = Some(Default::default());
        assert_eq!(reconciler.extract_token(&nrt), None, "empty annotations");

        nrt.set_annotation(FINGERPRINT_ANNOTATION, "test");
        assert_eq!(reconciler.extract_token(&nrt), Some("test"));
    }

    #[test]
    fn test_is_consistent() {
        let index = Arc::new(NodeWorkloadIndex::new());
        index.observe_placed("node-0", &single_container_pod());
        let reconciler = FingerprintReconciler::new(index.clone());

        let mut nrt = TopologySnapshot::new("node-0");
        assert!(!reconciler.is_consistent(&nrt), "untagged snapshot trusted");

        nrt.set_annotation(FINGERPRINT_ANNOTATION, reconciler.compute_local_token("node-0"));
        assert!(reconciler.is_consistent(&nrt));

        index.observe_placed("node-0", &Workload::new("ns-0", "pod-1"));
        assert!(!reconciler.is_consistent(&nrt), "outdated snapshot trusted");
    }

    #[test]
    fn test_reservations_as_workload_source() {
        let rs = Arc::new(ResourceStore::new());
        rs.add_workload("node-0", &single_container_pod());
        let reconciler = FingerprintReconciler::new(rs.clone());

        let index = Arc::new(NodeWorkloadIndex::new());
        index.observe_placed("node-0", &single_container_pod());
        let from_index = FingerprintReconciler::new(index);

        // both sources describe the same workload set
        assert_eq!(
            reconciler.compute_local_token("node-0"),
            from_index.compute_local_token("node-0")
        );
    }
}

mod concurrency {
    use super::*;
    use std::thread;

    #[test]
    fn test_writers_and_readers_do_not_alias() {
        let mut report = TopologySnapshot::new("node");
        report.zones.push(Zone {
            name: "node-0".to_string(),
            zone_type: ZONE_TYPE_NODE.to_string(),
            resources: vec![res_info(RESOURCE_CPU, "64", "64")],
        });
        let store = Arc::new(NrtStore::new(&[report]));
        let rs = Arc::new(ResourceStore::new());

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let rs = rs.clone();
                thread::spawn(move || {
                    for i in 0..16 {
                        let pod = Workload::new("ns", format!("pod-{w}-{i}")).with_container(
                            Container::new("c").with_request(RESOURCE_CPU, Quantity::from_units(1)),
                        );
                        rs.add_workload("node", &pod);
                    }
                })
            })
            .collect();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                let rs = rs.clone();
                thread::spawn(move || {
                    for _ in 0..16 {
                        let mut view = store.get_copy_by_node_name("node").unwrap();
                        rs.apply_overlay("reader", &mut view);
                        let cpu = view.zones[0].resources[0].available;
                        assert!(cpu >= Quantity::zero() && cpu <= Quantity::from_units(64));
                    }
                })
            })
            .collect();

        for handle in writers.into_iter().chain(readers) {
            handle.join().unwrap();
        }

        let mut view = store.get_copy_by_node_name("node").unwrap();
        rs.apply_overlay("final", &mut view);
        assert_eq!(view.zones[0].resources[0].available, Quantity::zero());
        let pristine = store.get_copy_by_node_name("node").unwrap();
        assert_eq!(pristine.zones[0].resources[0].available, q("64"));
    }
}
