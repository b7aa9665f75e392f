#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::network::protocol::{Request, Response};
    use crate::network::{Endpoint, Network};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Endpoint that records how many requests reached it.
    struct Probe {
        served: AtomicUsize,
    }

    impl Probe {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                served: AtomicUsize::new(0),
            })
        }
    }

    impl Endpoint for Probe {
        fn handle(&self, _request: Request) -> crate::error::Result<Response> {
            self.served.fetch_add(1, Ordering::SeqCst);
            Ok(Response::Done)
        }
    }

    #[test]
    fn test_send_reaches_registered_endpoint() {
        let network = Network::new();
        let probe = Probe::new();
        network.register(7, probe.clone());

        let response = network.send(1, 7, Request::Predecessor).unwrap();
        assert!(matches!(response, Response::Done));
        assert_eq!(probe.served.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_send_to_unknown_peer_fails() {
        let network = Network::new();

        let err = network.send(1, 99, Request::Predecessor).unwrap_err();
        assert_eq!(err, Error::UnknownPeer(99));
    }

    #[test]
    fn test_unregister_removes_endpoint() {
        let network = Network::new();
        network.register(7, Probe::new());
        assert!(network.contains(7));

        network.unregister(7);
        assert!(!network.contains(7));
        assert!(network.send(1, 7, Request::Predecessor).is_err());
    }

    // ============================================================
    // HOP ACCOUNTING
    // ============================================================

    #[test]
    fn test_hops_count_sends_but_not_delivers() {
        let network = Network::new();
        network.register(7, Probe::new());

        let scope = network.begin_op();
        network.send(1, 7, Request::Predecessor).unwrap();
        network.send(1, 7, Request::Predecessor).unwrap();
        network.deliver(1, 7, Request::Predecessor).unwrap();
        assert_eq!(scope.end(), 2);
    }

    #[test]
    fn test_sends_outside_scope_are_not_counted() {
        let network = Network::new();
        network.register(7, Probe::new());

        network.send(1, 7, Request::Predecessor).unwrap();

        let scope = network.begin_op();
        assert_eq!(scope.hops(), 0);
        network.send(1, 7, Request::Predecessor).unwrap();
        assert_eq!(scope.end(), 1);
    }

    #[test]
    fn test_nested_scope_restores_outer_counter() {
        let network = Network::new();
        network.register(7, Probe::new());

        let outer = network.begin_op();
        network.send(1, 7, Request::Predecessor).unwrap();

        let inner = network.begin_op();
        network.send(1, 7, Request::Predecessor).unwrap();
        network.send(1, 7, Request::Predecessor).unwrap();
        assert_eq!(inner.end(), 2);

        // The outer operation continues where it left off.
        network.send(1, 7, Request::Predecessor).unwrap();
        assert_eq!(outer.end(), 2);
    }

    #[test]
    fn test_failed_send_counts_no_hop() {
        let network = Network::new();

        let scope = network.begin_op();
        assert!(network.send(1, 99, Request::Predecessor).is_err());
        assert_eq!(scope.end(), 0);
    }

    #[test]
    fn test_hop_counters_are_thread_local() {
        let network = Network::new();
        network.register(7, Probe::new());

        std::thread::scope(|s| {
            let mut handles = Vec::new();
            for hops in 1..=4u32 {
                let network = network.clone();
                handles.push(s.spawn(move || {
                    let scope = network.begin_op();
                    for _ in 0..hops {
                        network.send(0, 7, Request::Predecessor).unwrap();
                    }
                    (hops, scope.end())
                }));
            }
            for handle in handles {
                let (expected, counted) = handle.join().unwrap();
                assert_eq!(counted, expected);
            }
        });
    }
}
