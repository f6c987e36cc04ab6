//! Bind / interrupt / wait / handler behaviour with a live loop.

mod common;

use common::{eventually, host_with, settle, Harness, RecordingEngine, RecordingScript};
use marionette::{
    Callback, ControlError, EventKind, EventPayload, MarionetteConfig, ScriptError, SessionError,
    SessionState, WorldEvent,
};
use marionette_core::{CommandError, Dispatch, EntityId, InterruptCause};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn chat(message: &str) -> EventPayload {
    EventPayload::Chat {
        player: "steve".into(),
        message: message.into(),
    }
}

#[test]
fn test_interrupt_releases_blocked_wait() {
    let id = EntityId::new(1);
    let (host, sessions) = host_with(&[id], MarionetteConfig::immediate());
    let session = Arc::clone(&sessions[0]);
    let _harness = Harness::start(host);

    let waiter = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.wait_for(EventKind::Redstone))
    };
    assert!(eventually(|| session.is_waiting_for(&EventKind::Redstone)));

    session.interrupt();
    assert_eq!(
        waiter.join().unwrap(),
        Err(CommandError::Interrupted(InterruptCause::Interrupted))
    );
}

#[test]
fn test_interrupt_cancels_queued_commands() {
    let id = EntityId::new(1);
    let config = MarionetteConfig {
        scheduler: marionette::SchedulerConfig {
            command_delay_ticks: 1_000_000,
        },
        ..MarionetteConfig::immediate()
    };
    let (host, sessions) = host_with(&[id], config);
    let session = Arc::clone(&sessions[0]);
    let runner = Arc::clone(host.runtime().runner());
    let _harness = Harness::start(host);

    let walker = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.forward(1))
    };
    assert!(eventually(|| runner.pending_for(id) == 1));

    session.interrupt();
    assert_eq!(
        walker.join().unwrap(),
        Err(CommandError::Interrupted(InterruptCause::Interrupted))
    );
    assert_eq!(runner.pending_for(id), 0);
}

#[test]
fn test_second_wait_supersedes_first_and_gets_payload() {
    let id = EntityId::new(1);
    let (host, sessions) = host_with(&[id], MarionetteConfig::immediate());
    let publisher = host.publisher();
    let session = Arc::clone(&sessions[0]);
    let _harness = Harness::start(host);

    let first = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.wait_for(EventKind::Chat))
    };
    assert!(eventually(|| session.is_waiting_for(&EventKind::Chat)));
    let second_wait = session.register_wait(EventKind::Chat).unwrap();

    assert_eq!(
        first.join().unwrap(),
        Err(CommandError::Interrupted(InterruptCause::Superseded))
    );
    assert!(publisher.publish(WorldEvent::broadcast(chat("ready"))));
    assert_eq!(settle(&second_wait), Ok(chat("ready")));
}

#[test]
fn test_rebinding_drops_previous_handlers() {
    let id = EntityId::new(1);
    let (host, sessions) = host_with(&[id], MarionetteConfig::immediate());
    let publisher = host.publisher();
    let session = Arc::clone(&sessions[0]);
    let _harness = Harness::start(host);

    let s1_hits = Arc::new(AtomicUsize::new(0));
    session.bind(Arc::new(RecordingScript::default())).unwrap();
    {
        let hits = Arc::clone(&s1_hits);
        session
            .set_event_handler(
                EventKind::Chat,
                Arc::new(move |_: &EventPayload| {
                    hits.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
    }
    assert!(publisher.publish(WorldEvent::broadcast(chat("one"))));
    assert!(eventually(|| s1_hits.load(Ordering::SeqCst) == 1));

    assert!(session.interrupt());
    assert_eq!(session.state(), SessionState::Idle);
    session.bind(Arc::new(RecordingScript::default())).unwrap();

    // A marker wait proves the next event has been delivered.
    let marker = session.register_wait(EventKind::Chat).unwrap();
    assert!(publisher.publish(WorldEvent::broadcast(chat("two"))));
    assert_eq!(settle(&marker), Ok(chat("two")));
    thread::sleep(Duration::from_millis(20));
    assert_eq!(s1_hits.load(Ordering::SeqCst), 1);
    assert!(!session.has_event_handler(&EventKind::Chat));
}

#[test]
fn test_events_target_one_entity() {
    let ids = [EntityId::new(1), EntityId::new(2)];
    let (host, sessions) = host_with(&ids, MarionetteConfig::immediate());
    let publisher = host.publisher();
    let _harness = Harness::start(host);

    let for_first = sessions[0].register_wait(EventKind::Message).unwrap();
    let for_second = sessions[1].register_wait(EventKind::Message).unwrap();
    let message = EventPayload::Message {
        sender: "server".into(),
        body: "hello 2".into(),
    };
    assert!(publisher.publish(WorldEvent::to_entity(ids[1], message.clone())));

    assert_eq!(settle(&for_second), Ok(message));
    assert!(!for_first.is_done());
    assert_eq!(
        sessions[1].next_event_message().map(|m| m.body),
        Some("hello 2".to_string())
    );
    assert_eq!(sessions[0].next_event_message(), None);
}

#[test]
fn test_update_callback_dropped_while_busy() {
    let id = EntityId::new(1);
    let (host, sessions) = host_with(&[id], MarionetteConfig::immediate());
    let session = Arc::clone(&sessions[0]);
    let script = Arc::new(RecordingScript::default());
    script.hold_updates.store(true, Ordering::Release);
    session.bind(script.clone()).unwrap();
    let pool = Arc::clone(host.runtime().pool());
    let harness = Harness::start(host);

    assert!(eventually(|| script.count(Callback::Update) == 1));
    assert!(eventually(|| session.state() == SessionState::Running));
    thread::sleep(Duration::from_millis(30));
    // Many ticks have passed, but the blocked update was never doubled up.
    assert_eq!(script.count(Callback::Update), 1);
    assert!(pool.stats().dropped_busy > 0);

    script.hold_updates.store(false, Ordering::Release);
    assert!(eventually(|| script.count(Callback::Update) > 1));
    drop(harness);
}

#[test]
fn test_controller_runs_and_stops_scripts() {
    let id = EntityId::new(1);
    let (host, _) = host_with(&[id], MarionetteConfig::immediate());
    let engine = Arc::new(RecordingEngine::default());
    let controller = host.controller(engine.clone());
    let _harness = Harness::start(host);

    let attachment = controller.attach(id).unwrap();
    assert_eq!(attachment.run_script("bot.forward(1)", "js"), Ok(Dispatch::Started));
    let first = Arc::clone(&engine.loaded.lock()[0].2);
    assert!(eventually(|| first.count(Callback::Start) == 1));

    // Running a new script replaces the old one.
    attachment.run_script("print('hi')", "python").unwrap();
    assert!(eventually(|| first.stopped.load(Ordering::Acquire)));
    let second = Arc::clone(&engine.loaded.lock()[1].2);

    attachment.stop();
    assert!(eventually(|| second.count(Callback::Stop) == 1));
    assert!(eventually(|| second.stopped.load(Ordering::Acquire)));
    assert_eq!(attachment.session().state(), SessionState::Idle);

    assert_eq!(
        attachment.run_script("x", "lua"),
        Err(ControlError::Script(ScriptError::UnsupportedLanguage("lua".into())))
    );
    assert!(matches!(
        attachment.run_script("syntax error", "js"),
        Err(ControlError::Script(ScriptError::Load(_)))
    ));
    assert_eq!(
        controller.attach(EntityId::new(99)).map(|_| ()),
        Err(ControlError::Session(SessionError::UnknownEntity(EntityId::new(99))))
    );
}

#[test]
fn test_despawn_fails_everything_pending() {
    let id = EntityId::new(1);
    let (mut host, sessions) = host_with(&[id], MarionetteConfig::immediate());
    let session = Arc::clone(&sessions[0]);
    session.bind(Arc::new(RecordingScript::default())).unwrap();
    let wait = session.register_wait(EventKind::Chat).unwrap();

    host.despawn_session(id).unwrap();
    assert_eq!(
        settle(&wait),
        Err(CommandError::Interrupted(InterruptCause::TornDown))
    );
    assert_eq!(
        session.forward(1),
        Err(CommandError::Interrupted(InterruptCause::TornDown))
    );
    assert!(host.registry().get(id).is_none());
}
