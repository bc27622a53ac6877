//! Races between joins, stop and hangup

use std::sync::{Arc, Barrier};
use std::thread;

use pretty_assertions::assert_eq;

use bridgemon_core::config::BridgeMonConfig;
use bridgemon_core::host::{Channel, Host, VariableStore};
use bridgemon_core::SessionManager;

const PEER: &str = "BRIDGEPEERID";
const ROUNDS: usize = 200;

fn quiet_config() -> BridgeMonConfig {
    let mut config = BridgeMonConfig::default();
    config.diagnostics = false;
    config
}

fn channels(host: &Host, round: usize) -> (Arc<Channel>, Arc<Channel>) {
    let alice = host
        .create_channel(&format!("PJSIP/alice-{:08}", round))
        .expect("create alice");
    let bob = host
        .create_channel(&format!("PJSIP/bob-{:08}", round))
        .expect("create bob");
    (alice, bob)
}

/// Both parties join at once; the peer id still lands exactly as expected
#[test]
fn test_simultaneous_joins() {
    let host = Arc::new(Host::new());
    let sessions = SessionManager::new(host.clone(), &quiet_config());

    for round in 0..ROUNDS {
        let (alice, bob) = channels(&host, round);
        sessions.start(&alice, None).expect("start");
        let bridge = host.create_bridge();
        let barrier = Arc::new(Barrier::new(2));

        let joiners: Vec<_> = [alice.clone(), bob.clone()]
            .into_iter()
            .map(|channel| {
                let host = host.clone();
                let bridge = bridge.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    host.join_bridge(&bridge, &channel).expect("join");
                })
            })
            .collect();
        for joiner in joiners {
            joiner.join().expect("joiner panicked");
        }

        assert_eq!(alice.variable(PEER).as_deref(), Some(bob.unique_id()), "round {}", round);
        host.hangup(&alice);
        host.hangup(&bob);
    }
}

/// A join racing stop either writes before stop returns or not at all
#[test]
fn test_stop_racing_join() {
    let host = Arc::new(Host::new());
    let sessions = Arc::new(SessionManager::new(host.clone(), &quiet_config()));

    for round in 0..ROUNDS {
        let (alice, bob) = channels(&host, round);
        sessions.start(&alice, None).expect("start");
        let bridge = host.create_bridge();
        host.join_bridge(&bridge, &alice).expect("join alice");
        let barrier = Arc::new(Barrier::new(2));

        let joiner = {
            let (host, bridge, bob, barrier) = (host.clone(), bridge.clone(), bob.clone(), barrier.clone());
            thread::spawn(move || {
                barrier.wait();
                host.join_bridge(&bridge, &bob).expect("join bob");
            })
        };
        let stopper = {
            let (sessions, alice, barrier) = (sessions.clone(), alice.clone(), barrier.clone());
            thread::spawn(move || {
                barrier.wait();
                sessions.stop(&alice, None).expect("stop");
                // Anything written after this point came from a stopped session
                alice.set_variable(PEER, "");
            })
        };
        joiner.join().expect("joiner panicked");
        stopper.join().expect("stopper panicked");

        assert_eq!(alice.variable(PEER).as_deref(), Some(""), "round {}", round);
        assert_eq!(host.hook_count(&alice), 0);
        host.hangup(&alice);
        host.hangup(&bob);
    }
}

/// Hangup and stop racing each other leave nothing behind
#[test]
fn test_stop_racing_hangup() {
    let host = Arc::new(Host::new());
    let sessions = Arc::new(SessionManager::new(host.clone(), &quiet_config()));

    for round in 0..ROUNDS {
        let (alice, bob) = channels(&host, round);
        sessions.start(&alice, None).expect("start");
        let barrier = Arc::new(Barrier::new(2));

        let hanger = {
            let (host, alice, barrier) = (host.clone(), alice.clone(), barrier.clone());
            thread::spawn(move || {
                barrier.wait();
                host.hangup(&alice)
            })
        };
        let stopper = {
            let (sessions, alice, barrier) = (sessions.clone(), alice.clone(), barrier.clone());
            thread::spawn(move || {
                barrier.wait();
                sessions.stop(&alice, None)
            })
        };
        assert!(hanger.join().expect("hanger panicked"));
        match stopper.join().expect("stopper panicked") {
            Ok(()) => {}
            Err(e) => assert!(e.is_not_found(), "round {}: {}", round, e),
        }

        assert!(sessions.sessions(&alice).is_empty());
        assert_eq!(host.hook_count(&alice), 0);
        host.hangup(&bob);
    }
}

/// Concurrent starts with the same id: exactly one wins
#[test]
fn test_concurrent_duplicate_start() {
    let host = Arc::new(Host::new());
    let sessions = Arc::new(SessionManager::new(host.clone(), &quiet_config()));
    let alice = host.create_channel("PJSIP/alice-1").expect("create alice");
    let barrier = Arc::new(Barrier::new(4));

    let starters: Vec<_> = (0..4)
        .map(|_| {
            let (sessions, alice, barrier) = (sessions.clone(), alice.clone(), barrier.clone());
            thread::spawn(move || {
                barrier.wait();
                sessions.start(&alice, Some("shared")).is_ok()
            })
        })
        .collect();
    let wins = starters
        .into_iter()
        .map(|s| s.join().expect("starter panicked"))
        .filter(|won| *won)
        .count();

    assert_eq!(wins, 1);
    assert_eq!(sessions.sessions(&alice), vec!["shared".to_string()]);
    assert_eq!(host.hook_count(&alice), 1);
}

/// A join racing hangup never leaves the hung-up channel in the bridge
#[test]
fn test_hangup_racing_join() {
    let host = Arc::new(Host::new());
    let sessions = SessionManager::new(host.clone(), &quiet_config());

    for round in 0..ROUNDS {
        let (alice, bob) = channels(&host, round);
        let carol = host
            .create_channel(&format!("PJSIP/carol-{:08}", round))
            .expect("create carol");
        let bridge = host.create_bridge();
        let barrier = Arc::new(Barrier::new(2));

        let joiner = {
            let (host, bridge, carol, barrier) = (host.clone(), bridge.clone(), carol.clone(), barrier.clone());
            thread::spawn(move || {
                barrier.wait();
                // Refused once the hangup wins
                let _ = host.join_bridge(&bridge, &carol);
            })
        };
        let hanger = {
            let (host, carol, barrier) = (host.clone(), carol.clone(), barrier.clone());
            thread::spawn(move || {
                barrier.wait();
                host.hangup(&carol)
            })
        };
        joiner.join().expect("joiner panicked");
        assert!(hanger.join().expect("hanger panicked"));

        let members = host.bridge(&bridge).expect("bridge").members();
        assert!(members.iter().all(|m| !m.is_hung_up()), "round {}", round);
        assert_eq!(host.bridge_of(&carol), None, "round {}", round);

        sessions.start(&alice, None).expect("start");
        host.join_bridge(&bridge, &alice).expect("join alice");
        host.join_bridge(&bridge, &bob).expect("join bob");
        assert_eq!(alice.variable(PEER).as_deref(), Some(bob.unique_id()), "round {}", round);

        host.hangup(&alice);
        host.hangup(&bob);
        host.destroy_bridge(&bridge);
    }
}

/// A channel joined into two bridges at once ends up in exactly one
#[test]
fn test_join_racing_join() {
    let host = Arc::new(Host::new());

    for round in 0..ROUNDS {
        let (alice, bob) = channels(&host, round);
        let bridges = [host.create_bridge(), host.create_bridge()];
        let barrier = Arc::new(Barrier::new(2));

        let joiners: Vec<_> = bridges
            .iter()
            .cloned()
            .map(|bridge| {
                let (host, alice, barrier) = (host.clone(), alice.clone(), barrier.clone());
                thread::spawn(move || {
                    barrier.wait();
                    host.join_bridge(&bridge, &alice).expect("join");
                })
            })
            .collect();
        for joiner in joiners {
            joiner.join().expect("joiner panicked");
        }

        let holding: Vec<&String> = bridges
            .iter()
            .filter(|id| host.bridge(id).expect("bridge").is_member(&alice))
            .collect();
        assert_eq!(holding.len(), 1, "round {}", round);
        assert_eq!(host.bridge_of(&alice).as_ref(), Some(holding[0]), "round {}", round);

        for id in &bridges {
            host.destroy_bridge(id);
        }
        host.hangup(&alice);
        host.hangup(&bob);
    }
}
