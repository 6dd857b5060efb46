mod common;

use common::{get_endpoint, request, ControlledChannel, Gate, ScriptedChannel};
use std::sync::Arc;
use switchboard::{Channel, ErrorType, QueuedChannel};

fn queue_over(gate: Arc<Gate>, max_queue_size: usize) -> QueuedChannel {
    QueuedChannel::new(gate, Arc::from("test-channel"), max_queue_size)
}

#[tokio::test]
async fn fast_path_dispatches_without_queueing() {
    let transport = ScriptedChannel::new();
    let gate = Gate::new(transport.clone(), 1);
    let queue = queue_over(gate, 10);

    let response = queue
        .execute(&get_endpoint(), &request())
        .await
        .expect("dispatched");

    assert_eq!(200, response.status().as_u16());
    assert_eq!(1, transport.hits());
    assert!(queue.is_empty());
    response.close();
}

#[tokio::test]
async fn overflow_fails_synchronously_with_queue_is_full() {
    let transport = ScriptedChannel::new();
    let gate = Gate::new(transport.clone(), 0);
    let queue = queue_over(gate, 2);

    let first = queue.execute(&get_endpoint(), &request());
    let second = queue.execute(&get_endpoint(), &request());
    assert_eq!(2, queue.len());

    let error = queue
        .execute(&get_endpoint(), &request())
        .await
        .expect_err("queue is bounded");
    assert!(matches!(error.kind(), ErrorType::QueueFull));
    assert_eq!("queue is full", error.to_string());
    assert_eq!(0, transport.hits());

    drop(first);
    drop(second);
}

#[tokio::test]
async fn zero_capacity_queue_still_has_a_fast_path() {
    let transport = ScriptedChannel::new();
    let gate = Gate::new(transport.clone(), 1);
    let queue = queue_over(gate.clone(), 0);

    // Token available: the optimistic dispatch succeeds.
    let response = queue
        .execute(&get_endpoint(), &request())
        .await
        .expect("dispatched");
    response.close();

    // No token and no room to park: immediate rejection.
    let error = queue
        .execute(&get_endpoint(), &request())
        .await
        .expect_err("no capacity anywhere");
    assert!(matches!(error.kind(), ErrorType::QueueFull));
}

#[tokio::test]
async fn drains_in_fifo_order_as_capacity_returns() {
    let transport = ControlledChannel::new();
    let gate = Gate::new(transport.clone(), 0);
    let queue = queue_over(gate.clone(), 10);

    let first = tokio::spawn(queue.execute(&get_endpoint(), &request()));
    let second = tokio::spawn(queue.execute(&get_endpoint(), &request()));
    common::wait_until(|| queue.len() == 2).await;

    // Returning capacity alone re-drives nothing; the next submission does.
    gate.add_tokens(3);
    let third = tokio::spawn(queue.execute(&get_endpoint(), &request()));
    common::wait_until(|| transport.pending() == 3).await;

    assert!(transport.complete_next(201));
    assert!(transport.complete_next(202));
    assert!(transport.complete_next(203));

    let statuses = [
        first.await.unwrap().unwrap(),
        second.await.unwrap().unwrap(),
        third.await.unwrap().unwrap(),
    ]
    .map(|response| {
        let status = response.status().as_u16();
        response.close();

        status
    });

    assert_eq!([201, 202, 203], statuses);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn cancelled_entry_is_dropped_by_the_next_drain() {
    let transport = ControlledChannel::new();
    let gate = Gate::new(transport.clone(), 1);
    let queue = queue_over(gate.clone(), 10);

    // First request takes the only token and stays in flight.
    let first = tokio::spawn(queue.execute(&get_endpoint(), &request()));
    common::wait_until(|| transport.pending() == 1).await;

    // Second parks, then its caller walks away.
    let second = tokio::spawn(queue.execute(&get_endpoint(), &request()));
    common::wait_until(|| queue.len() == 1).await;
    second.abort();
    let _ = second.await;

    // Completion of the first re-drives the queue; the cancelled entry is
    // discarded without dispatching, even though a token is available.
    gate.add_tokens(1);
    assert!(transport.complete_next(200));
    let response = first.await.unwrap().unwrap();
    response.close();

    common::wait_until(|| queue.is_empty()).await;
    assert_eq!(1, transport.hits());
}

#[tokio::test]
async fn cancellation_propagates_to_the_dispatched_request() {
    let transport = ControlledChannel::new();
    let gate = Gate::new(transport.clone(), 1);
    let queue = queue_over(gate, 10);

    let caller = tokio::spawn(queue.execute(&get_endpoint(), &request()));
    common::wait_until(|| transport.pending() == 1).await;

    caller.abort();
    let _ = caller.await;
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }

    // The forwarder drops the downstream future once the caller is gone, so
    // delivering the response fails.
    assert!(!transport.complete_next(200));
}
