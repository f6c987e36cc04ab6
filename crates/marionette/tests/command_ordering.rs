//! Ordering and admission of commands submitted from script threads.

mod common;

use common::{host_with, settle, Harness};
use marionette::{MarionetteConfig, StaminaConfig};
use marionette_core::{CommandError, EntityId};
use marionette_world::{BlockPos, Placement};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;

#[test]
fn test_concurrent_callers_keep_their_own_order() {
    let id = EntityId::new(1);
    let (host, _) = host_with(&[id], MarionetteConfig::immediate());
    let runner = Arc::clone(host.runtime().runner());
    let harness = Harness::start(host);

    let log = Arc::new(Mutex::new(Vec::new()));
    let callers: Vec<_> = (0..6)
        .map(|caller| {
            let runner = Arc::clone(&runner);
            let log = Arc::clone(&log);
            thread::spawn(move || {
                for n in 0..50 {
                    let log = Arc::clone(&log);
                    let delay = u64::from(n % 3 == 0);
                    let future = runner.submit_for_result(Some(id), delay, move |_world| {
                        log.lock().push((caller, n));
                        Ok(())
                    });
                    // Every fifth command is fire-and-wait, the rest pipeline.
                    if n % 5 == 0 {
                        settle(&future).unwrap();
                    }
                }
            })
        })
        .collect();
    for caller in callers {
        caller.join().unwrap();
    }
    assert!(common::eventually(|| log.lock().len() == 300));
    drop(harness);

    let log = log.lock();
    for caller in 0..6 {
        let seen: Vec<_> = log
            .iter()
            .filter(|(c, _)| *c == caller)
            .map(|(_, n)| *n)
            .collect();
        assert_eq!(seen, (0..50).collect::<Vec<_>>(), "caller {caller} reordered");
    }
}

#[test]
fn test_sessions_interleave_without_blocking_each_other() {
    let ids = [EntityId::new(1), EntityId::new(2)];
    let (host, sessions) = host_with(&ids, MarionetteConfig::immediate());
    let _harness = Harness::start(host);

    let walkers: Vec<_> = sessions
        .iter()
        .cloned()
        .map(|session| {
            thread::spawn(move || (0..5).map(|_| session.forward(1)).collect::<Vec<_>>())
        })
        .collect();
    for walker in walkers {
        assert!(walker.join().unwrap().into_iter().all(|step| step == Ok(true)));
    }
    assert_eq!(
        sessions[0].position().unwrap(),
        Placement::new(BlockPos::new(0, 64, 5), 0)
    );
    assert_eq!(
        sessions[1].position().unwrap(),
        Placement::new(BlockPos::new(3, 64, 5), 0)
    );
}

#[test]
fn test_rejected_command_never_reaches_queue() {
    let id = EntityId::new(1);
    let config = MarionetteConfig {
        stamina: StaminaConfig {
            max: 4,
            regen_per_tick: 0,
            ..StaminaConfig::default()
        },
        ..MarionetteConfig::immediate()
    };
    // No loop is running: an admitted command would sit in the queue.
    let (host, sessions) = host_with(&[id], config);
    let runner = host.runtime().runner();
    let before = runner.stats().submitted;

    assert_eq!(
        sessions[0].forward(5),
        Err(CommandError::AdmissionRejected { cost: 6, available: 4 })
    );
    assert_eq!(runner.pending_len(), 0);
    assert_eq!(runner.stats().submitted, before);
    assert_eq!(sessions[0].stamina(), 4);
}

#[test]
fn test_huge_step_count_is_not_free() {
    let id = EntityId::new(1);
    let (host, sessions) = host_with(&[id], MarionetteConfig::immediate());
    let runner = host.runtime().runner();
    let full = sessions[0].stamina();

    assert_eq!(
        sessions[0].forward(u32::MAX),
        Err(CommandError::AdmissionRejected {
            cost: u32::MAX,
            available: full,
        })
    );
    assert_eq!(runner.pending_for(id), 0);
    assert_eq!(sessions[0].stamina(), full);
}

#[test]
fn test_stamina_drains_then_recovers() {
    let id = EntityId::new(1);
    let config = MarionetteConfig {
        stamina: StaminaConfig {
            max: 6,
            regen_per_tick: 1,
            base_cost: 2,
            flat_cost: 1,
        },
        ..MarionetteConfig::immediate()
    };
    let (host, sessions) = host_with(&[id], config);
    let session = Arc::clone(&sessions[0]);
    let _harness = Harness::start(host);

    // Spend faster than regeneration can keep up with, until rejected.
    let mut rejected = false;
    for _ in 0..50 {
        match session.forward(4) {
            Ok(_) => {}
            Err(CommandError::AdmissionRejected { cost, .. }) => {
                assert_eq!(cost, 5);
                rejected = true;
                break;
            }
            Err(other) => panic!("unexpected error {other}"),
        }
    }
    assert!(rejected);
    assert!(common::eventually(|| session.stamina() == 6));
}
