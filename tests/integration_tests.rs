/// Integration tests for the session service
/// Exercises the facade end to end, including concurrent callers
use pairing_core::models::SessionState;
use pairing_core::{SessionService, StatusCode};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

#[test]
fn test_create_then_lookup_workflow() {
    let service = SessionService::new();

    let created = service.create_session(Some("meeting-1"), "alice_pk");
    assert_eq!(created.status, StatusCode::Ok);

    let session = service
        .get_session("meeting-1")
        .payload
        .expect("Session not found");
    assert_eq!(session.participants, vec!["alice_pk"]);
    assert_eq!(session.owner_key, "alice_pk");
    assert_eq!(session.state, SessionState::Created);
}

#[test]
fn test_duplicate_session_workflow() {
    let service = SessionService::new();

    service.create_session(Some("meeting-1"), "alice_pk");
    let second = service.create_session(Some("meeting-1"), "bob_pk");
    assert_eq!(second.status, StatusCode::DuplicateSession);
    assert!(second.payload.is_none());

    // Once closed, the id is free again
    service.close_session("meeting-1");
    let third = service.create_session(Some("meeting-1"), "bob_pk");
    assert_eq!(third.status, StatusCode::Ok);
    assert_eq!(third.payload.unwrap().owner_key, "bob_pk");
}

#[test]
fn test_join_list_and_ready_workflow() {
    let service = SessionService::new();
    let alice = service.generate_key_pair().payload.expect("Keygen failed");
    let bob = service.generate_key_pair().payload.expect("Keygen failed");

    let session_id = service
        .create_session(None, &alice.public_key)
        .payload
        .expect("Create failed")
        .session_id;

    let joined = service
        .join_session(&session_id, &bob.public_key)
        .payload
        .expect("Join failed");
    assert_eq!(joined.state, SessionState::Active);

    let listed = service.list_participants(&session_id).payload.unwrap();
    assert_eq!(listed, vec![alice.public_key.clone(), bob.public_key.clone()]);

    let ack_alice = service.acknowledge(&session_id, &alice.public_key, 2);
    assert_eq!(ack_alice.status, StatusCode::Ok);
    assert!(!ack_alice.payload.unwrap().is_ready);

    let ack_bob = service.acknowledge(&session_id, &bob.public_key, 2);
    assert!(ack_bob.payload.unwrap().is_ready);
}

#[test]
fn test_repeated_join_is_idempotent() {
    let service = SessionService::new();
    service.create_session(Some("s"), "alice");

    let once = service.join_session("s", "bob").payload.unwrap();
    let twice = service.join_session("s", "bob").payload.unwrap();

    assert_eq!(once.participants, twice.participants);
    assert_eq!(service.list_participants("s").payload.unwrap().len(), 2);
}

#[test]
fn test_n_joins_list_n_plus_one_in_order() {
    let service = SessionService::new();
    service.create_session(Some("s"), "owner");

    let joiners: Vec<String> = (0..10).map(|i| format!("peer_{}", i)).collect();
    for key in &joiners {
        assert!(service.join_session("s", key).is_ok());
    }

    let listed = service.list_participants("s").payload.unwrap();
    assert_eq!(listed.len(), joiners.len() + 1);
    assert_eq!(listed[0], "owner");
    assert_eq!(&listed[1..], joiners.as_slice());
}

#[test]
fn test_mismatched_count_never_ready() {
    let service = SessionService::new();
    service.create_session(Some("s"), "alice");
    service.join_session("s", "bob");

    for count in [0, 1, 3, -1] {
        service.acknowledge("s", "alice", count);
        let ack = service.acknowledge("s", "bob", count).payload.unwrap();
        assert!(!ack.is_ready, "count {} must not be ready", count);
    }

    assert!(service.acknowledge("s", "bob", 2).payload.unwrap().is_ready);
}

#[test]
fn test_join_closed_session_fails_without_mutation() {
    let service = SessionService::new();
    service.create_session(Some("s"), "alice");
    service.join_session("s", "bob");
    service.close_session("s");

    let result = service.join_session("s", "carol");

    assert_eq!(result.status, StatusCode::SessionClosed);
    let session = service.get_session("s").payload.unwrap();
    assert_eq!(session.participants, vec!["alice", "bob"]);
    assert_eq!(session.state, SessionState::Closed);
}

#[test]
fn test_error_statuses() {
    let service = SessionService::new();

    assert_eq!(
        service.list_participants("missing").status,
        StatusCode::SessionNotFound
    );
    assert_eq!(
        service.acknowledge("missing", "alice", 1).status,
        StatusCode::SessionNotFound
    );
    assert_eq!(service.close_session("missing").status, StatusCode::SessionNotFound);

    service.create_session(Some("s"), "alice");
    assert_eq!(
        service.acknowledge("s", "stranger", 1).status,
        StatusCode::ParticipantNotFound
    );
    assert_eq!(
        service.leave_session("s", "stranger").status,
        StatusCode::ParticipantNotFound
    );
}

#[test]
fn test_concurrent_joins_on_same_session() {
    let service = Arc::new(SessionService::new());
    service.create_session(Some("shared"), "owner");

    let threads = 16;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let service = service.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                service.join_session("shared", &format!("peer_{}", i)).status
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), StatusCode::Ok);
    }

    let listed = service.list_participants("shared").payload.unwrap();
    assert_eq!(listed.len(), threads + 1);
    assert_eq!(listed[0], "owner");
    for i in 0..threads {
        assert!(listed.contains(&format!("peer_{}", i)));
    }
    assert_eq!(
        service.get_session("shared").payload.unwrap().state,
        SessionState::Active
    );
}

#[test]
fn test_concurrent_acks_report_ready_exactly_once() {
    let service = Arc::new(SessionService::new());
    service.create_session(Some("s"), "p_0");
    let keys: Vec<String> = (0..8).map(|i| format!("p_{}", i)).collect();
    for key in &keys[1..] {
        service.join_session("s", key);
    }

    let barrier = Arc::new(Barrier::new(keys.len()));
    let handles: Vec<_> = keys
        .iter()
        .cloned()
        .map(|key| {
            let service = service.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                service.acknowledge("s", &key, 8).payload.unwrap().is_ready
            })
        })
        .collect();

    let ready: usize = handles
        .into_iter()
        .map(|h| h.join().unwrap() as usize)
        .sum();

    // Only the final acknowledgement observes every participant acknowledged
    assert_eq!(ready, 1);
}

#[test]
fn test_concurrent_creates_on_distinct_sessions() {
    let service = Arc::new(SessionService::new());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let service = service.clone();
            thread::spawn(move || {
                let id = format!("session_{}", i);
                assert!(service.create_session(Some(&id), "owner").is_ok());
                for j in 0..5 {
                    assert!(service.join_session(&id, &format!("peer_{}", j)).is_ok());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(service.session_count().payload, Some(8));
    for i in 0..8 {
        let listed = service
            .list_participants(&format!("session_{}", i))
            .payload
            .unwrap();
        assert_eq!(listed.len(), 6);
    }
}

#[test]
fn test_log_callback_can_reenter_service() {
    let service = Arc::new(SessionService::new());
    let observed = Arc::new(Mutex::new(Vec::new()));

    let inner = Arc::downgrade(&service);
    let captured = observed.clone();
    let registered = service.register_log_callback(move |message: &str| {
        if let Some(service) = inner.upgrade() {
            // reading the registry from inside the callback must not deadlock
            let count = service.session_count().payload.unwrap_or(0);
            captured
                .lock()
                .unwrap()
                .push(format!("{} [{}]", message, count));
        }
    });
    assert!(registered.is_ok());

    service.create_session(Some("s"), "alice");

    let observed = observed.lock().unwrap();
    assert_eq!(observed.last().unwrap(), "session s created by alice [1]");
}

#[test]
fn test_owner_leave_closes_session() {
    let service = SessionService::new();
    service.create_session(Some("s"), "alice");
    service.join_session("s", "bob");

    let left = service.leave_session("s", "bob").payload.unwrap();
    assert_eq!(left.participants, vec!["alice"]);

    let closed = service.leave_session("s", "alice").payload.unwrap();
    assert_eq!(closed.state, SessionState::Closed);
    assert_eq!(service.join_session("s", "carol").status, StatusCode::SessionClosed);
}
