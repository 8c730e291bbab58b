//! Connection pool behavior against mock connections.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use mongo_auth::{AuthMechanism, AuthenticatorFactory, ConnectionInitializer, Credential};
use mongo_driver_pool::{
    CheckOutFailedReason, CheckOutReason, ConnectionPool, PoolBuilder, PoolError, PoolEvent,
    RemovalReason, State,
};
use mongo_protocol::bson::doc;
use mongo_protocol::{
    CancellationToken, Connection, ConnectionError, Endpoint, ServerId, ServiceId,
};
use mongo_testing::{MockConnectionFactory, RecordingSubscriber, reply};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_test::assert_ok;

fn server_id() -> ServerId {
    ServerId::new(1, Endpoint::new("db.example.com", 27017))
}

fn build(
    factory: &Arc<MockConnectionFactory>,
    events: &RecordingSubscriber<PoolEvent>,
    configure: impl FnOnce(PoolBuilder) -> PoolBuilder,
) -> ConnectionPool {
    let recorder = events.clone();
    let builder = ConnectionPool::builder()
        .server_id(server_id())
        .factory(Arc::clone(factory))
        .maintenance_interval(Duration::from_secs(3600))
        .event_subscriber(move |event: &PoolEvent| recorder.record(event));
    configure(builder).build().unwrap()
}

fn ready(pool: &ConnectionPool) {
    pool.initialize().unwrap();
    pool.set_ready().unwrap();
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn removed(events: &RecordingSubscriber<PoolEvent>, reason: RemovalReason) -> usize {
    events.count(|e| matches!(e, PoolEvent::ConnectionRemoved { reason: r, .. } if *r == reason))
}

#[tokio::test]
async fn test_lifecycle_events_in_order() {
    let factory = Arc::new(MockConnectionFactory::new());
    let events = RecordingSubscriber::new();
    let pool = build(&factory, &events, |b| b);
    assert_eq!(pool.state(), State::Uninitialized);

    ready(&pool);
    assert_eq!(pool.state(), State::Ready);
    pool.dispose().await;
    assert_eq!(pool.state(), State::Disposed);

    assert_eq!(
        events.events(),
        vec![
            PoolEvent::PoolOpening,
            PoolEvent::PoolOpened,
            PoolEvent::PoolReady,
            PoolEvent::PoolClosing,
            PoolEvent::PoolClosed,
        ]
    );
}

#[tokio::test]
async fn test_initialize_twice_fails() {
    let factory = Arc::new(MockConnectionFactory::new());
    let pool = build(&factory, &RecordingSubscriber::new(), |b| b);
    pool.initialize().unwrap();
    assert!(matches!(
        pool.initialize(),
        Err(PoolError::InvalidOperation(_))
    ));
}

#[tokio::test]
async fn test_acquire_while_paused_fails() {
    let factory = Arc::new(MockConnectionFactory::new());
    let events = RecordingSubscriber::new();
    let pool = build(&factory, &events, |b| b);
    pool.initialize().unwrap();

    let err = pool
        .acquire_connection(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::Paused { .. }));
    assert_eq!(
        err.to_string(),
        "The connection pool is in paused state for server db.example.com:27017."
    );
    assert_eq!(
        events.count(|e| matches!(
            e,
            PoolEvent::CheckingOutFailed {
                reason: CheckOutFailedReason::ConnectionError,
                ..
            }
        )),
        1
    );
    assert_eq!(factory.created(), 0);
}

#[tokio::test]
async fn test_returned_connections_are_reused_lifo() {
    let factory = Arc::new(MockConnectionFactory::new());
    let events = RecordingSubscriber::new();
    let pool = build(&factory, &events, |b| b);
    ready(&pool);
    let cancel = CancellationToken::new();

    let first = pool.acquire_connection(&cancel).await.unwrap();
    let second = pool.acquire_connection(&cancel).await.unwrap();
    let second_id = second.id();
    assert_eq!(pool.used_count(), 2);
    drop(first);
    drop(second);
    assert_eq!(pool.dormant_count(), 2);

    let again = pool.acquire_connection(&cancel).await.unwrap();
    assert_eq!(again.id(), second_id);
    assert_eq!(factory.created(), 2);
    assert_eq!(
        events.count(|e| matches!(e, PoolEvent::CheckedOut { connection_id, .. } if *connection_id == second_id)),
        2
    );
}

#[tokio::test]
async fn test_checked_in_events_wrap_removal() {
    let factory = Arc::new(MockConnectionFactory::new());
    let events = RecordingSubscriber::new();
    let pool = build(&factory, &events, |b| b);
    ready(&pool);

    let handle = pool
        .acquire_connection(&CancellationToken::new())
        .await
        .unwrap();
    let id = handle.id();
    factory.probe(0).unwrap().set_expired(true);
    events.clear();
    drop(handle);

    let kinds: Vec<_> = events
        .events()
        .into_iter()
        .map(|e| match e {
            PoolEvent::CheckingIn { .. } => "checking in",
            PoolEvent::RemovingConnection { .. } => "removing",
            PoolEvent::ConnectionRemoved { .. } => "removed",
            PoolEvent::CheckedIn { .. } => "checked in",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, ["checking in", "removing", "removed", "checked in"]);
    assert_eq!(
        events.events()[1],
        PoolEvent::RemovingConnection {
            connection_id: id,
            reason: RemovalReason::Expired,
        }
    );
    assert!(factory.probe(0).unwrap().is_dropped());
    assert_eq!(pool.created_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_connection_is_checked_out_twice() {
    let factory = Arc::new(MockConnectionFactory::new());
    let pool = build(&factory, &RecordingSubscriber::new(), |b| {
        b.max_connections(5).max_connecting(2)
    });
    ready(&pool);
    let checked_out = Arc::new(Mutex::new(HashSet::new()));

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let pool = pool.clone();
            let checked_out = Arc::clone(&checked_out);
            tokio::spawn(async move {
                let cancel = CancellationToken::new();
                for _ in 0..10 {
                    let handle = pool.acquire_connection(&cancel).await.unwrap();
                    let local = handle.id().local_value();
                    assert!(checked_out.lock().insert(local), "{local} checked out twice");
                    tokio::task::yield_now().await;
                    checked_out.lock().remove(&local);
                    drop(handle);
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert!(factory.created() <= 5);
    assert_eq!(pool.used_count(), 0);
    assert_eq!(pool.metrics().checkouts_successful, 200);
}

#[tokio::test]
async fn test_min_connections_are_established_in_background() {
    let factory = Arc::new(MockConnectionFactory::new());
    let events = RecordingSubscriber::new();
    let pool = build(&factory, &events, |b| b.min_connections(3));
    ready(&pool);

    eventually(|| pool.dormant_count() == 3).await;
    assert_eq!(pool.created_count(), 3);
    assert_eq!(factory.created(), 3);
    assert_eq!(
        events.count(|e| matches!(e, PoolEvent::ConnectionAdded { .. })),
        3
    );
    assert_eq!(pool.maintenance_workers_spawned(), 1);
}

#[tokio::test]
async fn test_clear_makes_checked_out_connection_stale() {
    let factory = Arc::new(MockConnectionFactory::new());
    let events = RecordingSubscriber::new();
    let pool = build(&factory, &events, |b| b.min_connections(2));
    ready(&pool);
    eventually(|| pool.dormant_count() == 2).await;

    let handle = pool
        .acquire_connection(&CancellationToken::new())
        .await
        .unwrap();
    let id = handle.id();
    pool.clear(None, false).unwrap();
    assert_eq!(pool.state(), State::Paused);
    assert_eq!(pool.generation(), 1);
    assert!(handle.is_expired());

    drop(handle);
    assert!(events.events().contains(&PoolEvent::RemovingConnection {
        connection_id: id,
        reason: RemovalReason::Stale,
    }));
    assert!(events.count(|e| matches!(
        e,
        PoolEvent::ConnectionRemoved { connection_id, reason: RemovalReason::Stale, .. } if *connection_id == id
    )) == 1);

    // The dormant connection left over is pruned by maintenance.
    eventually(|| pool.dormant_count() == 0).await;
    assert!(matches!(
        pool.acquire_connection(&CancellationToken::new()).await,
        Err(PoolError::Paused { .. })
    ));
}

#[tokio::test]
async fn test_clear_while_paused_is_a_no_op() {
    let factory = Arc::new(MockConnectionFactory::new());
    let events = RecordingSubscriber::new();
    let pool = build(&factory, &events, |b| b);
    ready(&pool);

    pool.clear(None, false).unwrap();
    pool.clear(None, false).unwrap();
    assert_eq!(pool.generation(), 1);
    assert_eq!(
        events.count(|e| matches!(e, PoolEvent::PoolCleared { .. })),
        1
    );

    pool.set_ready().unwrap();
    assert!(pool.acquire_connection(&CancellationToken::new()).await.is_ok());
}

#[tokio::test]
async fn test_clear_wakes_waiters_with_paused_error() {
    let factory = Arc::new(MockConnectionFactory::new());
    let pool = build(&factory, &RecordingSubscriber::new(), |b| {
        b.max_connections(1).max_connecting(1).wait_queue_size(4)
    });
    ready(&pool);
    let held = pool
        .acquire_connection(&CancellationToken::new())
        .await
        .unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire_connection(&CancellationToken::new()).await })
    };
    eventually(|| pool.wait_queue_free_slots() == 3).await;

    pool.clear(None, false).unwrap();
    let result = timeout(Duration::from_secs(5), waiter).await.unwrap().unwrap();
    assert!(matches!(result, Err(PoolError::Paused { .. })));
    drop(held);
    assert_eq!(pool.wait_queue_free_slots(), 4);
}

#[tokio::test]
async fn test_wait_queue_rejects_when_full() {
    let gate = Arc::new(Semaphore::new(0));
    let factory = Arc::new(MockConnectionFactory::new().with_open_gate(Arc::clone(&gate)));
    let events = RecordingSubscriber::new();
    let pool = build(&factory, &events, |b| {
        b.max_connections(4).max_connecting(4).wait_queue_size(3)
    });
    ready(&pool);

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire_connection(&CancellationToken::new()).await })
        })
        .collect();
    eventually(|| pool.wait_queue_free_slots() == 0).await;

    let err = pool
        .acquire_connection(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::WaitQueueFull { .. }));
    assert_eq!(
        err.to_string(),
        "The wait queue for acquiring a connection to server db.example.com:27017 is full."
    );

    gate.add_permits(3);
    for waiter in waiters {
        assert_ok!(waiter.await.unwrap());
    }
    assert_eq!(pool.wait_queue_free_slots(), 3);
}

#[tokio::test]
async fn test_timeout_reports_pinned_checkouts() {
    let factory = Arc::new(MockConnectionFactory::new());
    let events = RecordingSubscriber::new();
    let pool = build(&factory, &events, |b| {
        b.max_connections(1)
            .max_connecting(1)
            .wait_queue_timeout(Duration::from_millis(50))
    });
    ready(&pool);
    let cancel = CancellationToken::new();

    let pinned = pool
        .acquire_connection_for(CheckOutReason::Cursor, &cancel)
        .await
        .unwrap();
    assert_eq!(pinned.check_out_reason(), Some(CheckOutReason::Cursor));
    assert_eq!(pool.check_outs_count(CheckOutReason::Cursor), 1);

    let err = pool.acquire_connection(&cancel).await.unwrap_err();
    assert!(matches!(err, PoolError::Timeout { .. }));
    let message = err.to_string();
    assert!(message.starts_with("Timed out after "), "{message}");
    assert!(
        message.ends_with(
            "waiting for a connection from the connection pool. maxPoolSize: 1, \
             connections in use by cursors: 1, connections in use by transactions: 0, \
             connections in use by other operations: 0."
        ),
        "{message}"
    );
    assert_eq!(
        events.count(|e| matches!(
            e,
            PoolEvent::CheckingOutFailed {
                reason: CheckOutFailedReason::Timeout,
                ..
            }
        )),
        1
    );

    drop(pinned);
    assert_eq!(pool.check_outs_count(CheckOutReason::Cursor), 0);
}

#[tokio::test]
async fn test_timeout_without_pinned_checkouts() {
    let factory = Arc::new(MockConnectionFactory::new());
    let pool = build(&factory, &RecordingSubscriber::new(), |b| {
        b.max_connections(1)
            .max_connecting(1)
            .wait_queue_timeout(Duration::from_millis(30))
    });
    ready(&pool);
    let cancel = CancellationToken::new();

    let mut held = pool.acquire_connection(&cancel).await.unwrap();
    held.set_check_out_reason_if_not_already_set(CheckOutReason::Transaction);
    held.set_check_out_reason_if_not_already_set(CheckOutReason::Cursor);
    assert_eq!(held.check_out_reason(), Some(CheckOutReason::Transaction));
    assert_eq!(pool.check_outs_count(CheckOutReason::Cursor), 0);
    drop(held);

    let _held = pool.acquire_connection(&cancel).await.unwrap();
    let err = pool.acquire_connection(&cancel).await.unwrap_err();
    assert!(
        err.to_string()
            .starts_with("Timed out waiting for a connection after "),
        "{err}"
    );
    assert!(err.is_retriable());
}

#[tokio::test]
async fn test_set_ready_and_dispose_are_idempotent() {
    let factory = Arc::new(MockConnectionFactory::new());
    let events = RecordingSubscriber::new();
    let pool = build(&factory, &events, |b| b);
    pool.initialize().unwrap();

    pool.set_ready().unwrap();
    pool.set_ready().unwrap();
    assert_eq!(pool.maintenance_workers_spawned(), 1);
    assert_eq!(events.count(|e| *e == PoolEvent::PoolReady), 1);

    pool.dispose().await;
    pool.dispose().await;
    assert!(!pool.is_maintenance_running());
    assert_eq!(events.count(|e| *e == PoolEvent::PoolClosed), 1);
    assert!(matches!(pool.set_ready(), Err(PoolError::Disposed { .. })));
    assert!(matches!(pool.clear(None, false), Err(PoolError::Disposed { .. })));
}

#[tokio::test]
async fn test_dispose_closes_dormant_and_returned_connections() {
    let factory = Arc::new(MockConnectionFactory::new());
    let events = RecordingSubscriber::new();
    let pool = build(&factory, &events, |b| b);
    ready(&pool);
    let cancel = CancellationToken::new();

    let kept = pool.acquire_connection(&cancel).await.unwrap();
    let returned = pool.acquire_connection(&cancel).await.unwrap();
    drop(returned);
    assert_eq!(pool.dormant_count(), 1);

    pool.dispose().await;
    assert_eq!(pool.dormant_count(), 0);
    assert_eq!(removed(&events, RemovalReason::PoolClosed), 1);
    assert!(kept.is_expired());

    events.clear();
    drop(kept);
    assert_eq!(removed(&events, RemovalReason::PoolClosed), 1);
    assert_eq!(
        events.count(|e| matches!(e, PoolEvent::CheckingIn { .. })),
        0
    );
    assert!(factory.probes().iter().all(|p| p.is_dropped()));

    let err = pool.acquire_connection(&cancel).await.unwrap_err();
    assert!(err.is_pool_closed());
    assert_eq!(
        events.count(|e| matches!(
            e,
            PoolEvent::CheckingOutFailed {
                reason: CheckOutFailedReason::PoolClosed,
                ..
            }
        )),
        1
    );
}

#[tokio::test]
async fn test_service_clear_is_isolated() {
    let factory = Arc::new(MockConnectionFactory::new());
    let events = RecordingSubscriber::new();
    let pool = build(&factory, &events, |b| b.load_balanced(true));
    pool.initialize().unwrap();
    pool.set_ready_non_pausable().unwrap();
    let cancel = CancellationToken::new();
    let x = ServiceId::generate();
    let y = ServiceId::generate();

    factory.set_service_id(Some(x));
    let on_x = pool.acquire_connection(&cancel).await.unwrap();
    factory.set_service_id(Some(y));
    let on_y = pool.acquire_connection(&cancel).await.unwrap();
    let y_id = on_y.id();
    assert_eq!(on_x.service_id(), Some(x));
    assert_eq!(on_y.service_id(), Some(y));
    assert_eq!(pool.service_connection_count(x), 1);

    pool.clear(Some(x), false).unwrap();
    assert_eq!(pool.state(), State::ReadyNonPausable);
    assert_eq!(pool.service_generation(x), 1);
    assert_eq!(pool.service_generation(y), 0);
    assert_eq!(pool.generation(), 0);
    assert!(on_x.is_expired());
    assert!(!on_y.is_expired());

    drop(on_x);
    drop(on_y);
    assert_eq!(removed(&events, RemovalReason::Stale), 1);
    assert_eq!(pool.service_connection_count(x), 0);

    let again = pool.acquire_connection(&cancel).await.unwrap();
    assert_eq!(again.id(), y_id);
}

#[tokio::test]
async fn test_global_clear_in_load_balanced_mode_does_not_pause() {
    let factory = Arc::new(MockConnectionFactory::new());
    let pool = build(&factory, &RecordingSubscriber::new(), |b| b.load_balanced(true));
    pool.initialize().unwrap();
    pool.set_ready_non_pausable().unwrap();
    let x = ServiceId::generate();
    factory.set_service_id(Some(x));

    let handle = pool
        .acquire_connection(&CancellationToken::new())
        .await
        .unwrap();
    pool.clear(None, false).unwrap();
    assert_eq!(pool.state(), State::ReadyNonPausable);
    assert_eq!(pool.generation(), 1);
    assert!(handle.is_expired());
    drop(handle);

    assert!(pool.acquire_connection(&CancellationToken::new()).await.is_ok());
    assert_eq!(factory.created(), 2);
}

#[tokio::test]
async fn test_close_in_use_interrupts_checked_out_connections() {
    let factory = Arc::new(MockConnectionFactory::new());
    let events = RecordingSubscriber::new();
    let pool = build(&factory, &events, |b| b);
    ready(&pool);
    let cancel = CancellationToken::new();

    let mut handle = pool.acquire_connection(&cancel).await.unwrap();
    pool.clear(None, true).unwrap();
    assert!(events.events().contains(&PoolEvent::PoolCleared {
        service_id: None,
        close_in_use: true,
    }));

    eventually(|| handle.is_interrupted()).await;
    assert!(handle.is_expired());
    let err = handle
        .run_command("admin", doc! { "ping": 1 }, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectionError::Closed));

    drop(handle);
    assert_eq!(removed(&events, RemovalReason::Interrupted), 1);
}

#[tokio::test]
async fn test_failed_top_up_is_not_retried_before_the_interval() {
    let factory = Arc::new(MockConnectionFactory::new());
    factory.fail_next_opens(10);
    let failures = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&failures);
    let pool = build(&factory, &RecordingSubscriber::new(), |b| {
        b.min_connections(1).exception_handler(move |err: &PoolError| {
            if err.is_retriable() {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        })
    });
    ready(&pool);

    eventually(|| failures.load(Ordering::SeqCst) == 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert_eq!(factory.created(), 1);
    assert_eq!(pool.state(), State::Ready);
    assert_eq!(pool.pending_count(), 0);
}

#[tokio::test]
async fn test_cancelled_checkout_releases_capacity() {
    let gate = Arc::new(Semaphore::new(0));
    let factory = Arc::new(MockConnectionFactory::new().with_open_gate(Arc::clone(&gate)));
    let events = RecordingSubscriber::new();
    let pool = build(&factory, &events, |b| b);
    ready(&pool);

    let cancel = CancellationToken::new();
    let waiter = {
        let pool = pool.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { pool.acquire_connection(&cancel).await })
    };
    eventually(|| pool.pending_count() == 1).await;
    cancel.cancel();

    let result = timeout(Duration::from_secs(5), waiter).await.unwrap().unwrap();
    assert!(matches!(result, Err(PoolError::Cancelled)));
    assert_eq!(pool.pending_count(), 0);
    assert_eq!(pool.used_count(), 0);
    assert!(factory.probe(0).unwrap().is_dropped());
    assert_eq!(pool.metrics().checkouts_failed, 1);
}

#[tokio::test]
async fn test_cancel_during_authentication_is_not_a_failure() {
    let factory = Arc::new(
        MockConnectionFactory::new()
            .with_script(|connection| connection.with_reply(reply::hello(1)).with_stall()),
    );
    let auth = AuthenticatorFactory::new(Credential::scram(
        AuthMechanism::ScramSha256,
        "user",
        "pencil",
    ))
    .unwrap();
    let handled = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&handled);
    let pool = build(&factory, &RecordingSubscriber::new(), |b| {
        b.initializer(ConnectionInitializer::new().with_authenticator_factory(auth))
            .exception_handler(move |_: &PoolError| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
    });
    ready(&pool);

    let cancel = CancellationToken::new();
    let waiter = {
        let pool = pool.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { pool.acquire_connection(&cancel).await })
    };
    eventually(|| {
        factory
            .probe(0)
            .is_some_and(|conn| conn.command_names().iter().any(|name| name == "saslStart"))
    })
    .await;
    cancel.cancel();

    let result = timeout(Duration::from_secs(5), waiter).await.unwrap().unwrap();
    assert!(matches!(result, Err(PoolError::Cancelled)), "{result:?}");
    assert_eq!(handled.load(Ordering::SeqCst), 0);
    assert!(factory.probe(0).unwrap().is_dropped());
    assert_eq!(pool.pending_count(), 0);
    assert_eq!(pool.used_count(), 0);
}

#[tokio::test]
async fn test_authentication_failure_surfaces() {
    let factory = Arc::new(MockConnectionFactory::new().with_script(|connection| {
        connection
            .with_reply(reply::hello(1))
            .with_reply(reply::command_error(
                18,
                "AuthenticationFailed",
                "Authentication failed.",
            ))
    }));
    let auth = AuthenticatorFactory::new(Credential::scram(
        AuthMechanism::ScramSha256,
        "user",
        "pencil",
    ))
    .unwrap();
    let pool = build(&factory, &RecordingSubscriber::new(), |b| {
        b.initializer(ConnectionInitializer::new().with_authenticator_factory(auth))
    });
    ready(&pool);

    let err = pool
        .acquire_connection(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::Authentication(_)), "{err:?}");
    assert!(factory.probe(0).unwrap().is_dropped());
    assert_eq!(pool.created_count(), 0);
}

#[tokio::test]
async fn test_idle_connections_are_replaced() {
    let factory = Arc::new(MockConnectionFactory::new());
    let events = RecordingSubscriber::new();
    let pool = build(&factory, &events, |b| b.max_idle_time(Duration::from_millis(20)));
    ready(&pool);
    let cancel = CancellationToken::new();

    drop(pool.acquire_connection(&cancel).await.unwrap());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let handle = pool.acquire_connection(&cancel).await.unwrap();
    assert_eq!(handle.id().local_value(), 2);
    assert_eq!(removed(&events, RemovalReason::Idle), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_acquisition() {
    let factory = Arc::new(MockConnectionFactory::new());
    let pool = build(&factory, &RecordingSubscriber::new(), |b| {
        b.max_connections(1).max_connecting(1).wait_queue_size(2)
    });
    ready(&pool);

    let blocking = pool.clone();
    let local = tokio::task::spawn_blocking(move || {
        let handle = blocking
            .acquire_connection_blocking(&CancellationToken::new())
            .unwrap();
        handle.id().local_value()
    })
    .await
    .unwrap();
    assert_eq!(local, 1);
    assert_eq!(pool.dormant_count(), 1);

    let held = pool
        .acquire_connection(&CancellationToken::new())
        .await
        .unwrap();
    let cancel = CancellationToken::new();
    let waiter = {
        let pool = pool.clone();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || pool.acquire_connection_blocking(&cancel))
    };
    eventually(|| pool.wait_queue_free_slots() == 1).await;
    cancel.cancel();

    let result = timeout(Duration::from_secs(5), waiter).await.unwrap().unwrap();
    assert!(matches!(result, Err(PoolError::Cancelled)), "{result:?}");
    assert_eq!(pool.wait_queue_free_slots(), 2);
    drop(held);
}

#[tokio::test]
async fn test_status_and_metrics() {
    let factory = Arc::new(MockConnectionFactory::new());
    let pool = build(&factory, &RecordingSubscriber::new(), |b| b.max_connections(4));
    ready(&pool);
    let cancel = CancellationToken::new();

    let first = pool.acquire_connection(&cancel).await.unwrap();
    drop(pool.acquire_connection(&cancel).await.unwrap());

    let status = pool.status();
    assert_eq!(status.in_use, 1);
    assert_eq!(status.available, 1);
    assert_eq!(status.total, 2);
    assert_eq!(status.max, 4);
    assert!((status.utilization() - 25.0).abs() < f64::EPSILON);
    assert!(!status.is_at_capacity());

    drop(first);
    let metrics = pool.metrics();
    assert_eq!(metrics.connections_created, 2);
    assert_eq!(metrics.checkouts_successful, 2);
    assert_eq!(metrics.connections_closed, 0);
    assert!((metrics.checkout_success_rate() - 1.0).abs() < f64::EPSILON);
}
