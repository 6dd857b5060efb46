mod common;

use common::{get_endpoint, request, ControlledChannel, ScriptedChannel};
use switchboard::{Channel, Client, ClientQos, ErrorType, Host, NodeSelectionStrategy};

#[tokio::test]
async fn requests_flow_through_the_whole_pipeline() {
    let east = ScriptedChannel::new();
    let west = ScriptedChannel::new();
    let client = Client::builder()
        .channel_name("pipeline-test")
        .client_name("tester")
        .host(Host::new("https://east.example.com", east.clone()))
        .host(Host::new("https://west.example.com", west.clone()))
        .build();

    assert_eq!("pipeline-test", client.channel_name());
    assert_eq!(Some("tester"), client.client_name());

    for _ in 0..4 {
        let response = client.execute(&get_endpoint(), &request()).await.unwrap();
        assert_eq!(200, response.status().as_u16());
        response.close();
    }

    assert_eq!(4, east.hits() + west.hits());
}

#[tokio::test]
async fn the_client_is_itself_a_channel() {
    let transport = ScriptedChannel::new();
    let client = Client::builder()
        .channel_name("pipeline-test")
        .host(Host::new("https://east.example.com", transport))
        .build();

    let channel: &dyn Channel = &client;
    let response = channel.execute(&get_endpoint(), &request()).await.unwrap();

    assert_eq!(200, response.status().as_u16());
    response.close();
}

#[tokio::test]
async fn saturating_one_host_fills_the_queue_and_then_fails_fast() {
    let transport = ControlledChannel::new();
    let client = Client::builder()
        .channel_name("pipeline-test")
        .host(Host::new("https://east.example.com", transport.clone()))
        .max_queue_size(2)
        .build();

    // The adaptive limit starts at 20: twenty requests dispatch.
    let mut in_flight = Vec::new();
    for _ in 0..20 {
        in_flight.push(tokio::spawn(client.execute(&get_endpoint(), &request())));
    }
    common::wait_until(|| transport.pending() == 20).await;

    // The next two park in the queue.
    let mut parked = Vec::new();
    for _ in 0..2 {
        parked.push(tokio::spawn(client.execute(&get_endpoint(), &request())));
    }
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
    assert_eq!(20, transport.pending());

    // Queue at capacity: the next submission fails without dispatching.
    let error = client
        .execute(&get_endpoint(), &request())
        .await
        .expect_err("queue is bounded");
    assert!(matches!(error.kind(), ErrorType::QueueFull));

    // Draining the host completes the in-flight calls and unparks the rest.
    for _ in 0..20 {
        assert!(transport.complete_next(200));
    }
    for handle in in_flight {
        let response = handle.await.unwrap().unwrap();
        response.close();
    }

    common::wait_until(|| transport.pending() == 2).await;
    for _ in 0..2 {
        assert!(transport.complete_next(200));
    }
    for handle in parked {
        let response = handle.await.unwrap().unwrap();
        response.close();
    }
}

#[tokio::test]
async fn disabling_client_qos_removes_the_admission_gate() {
    let transport = ControlledChannel::new();
    let client = Client::builder()
        .channel_name("pipeline-test")
        .host(Host::new("https://east.example.com", transport.clone()))
        .client_qos(ClientQos::DangerousDisableSympatheticClientQos)
        .node_selection_strategy(NodeSelectionStrategy::RoundRobin)
        .build();

    let mut handles = Vec::new();
    for _ in 0..30 {
        handles.push(tokio::spawn(client.execute(&get_endpoint(), &request())));
    }

    // Thirty concurrent dispatches against one host: no limiter in the way.
    common::wait_until(|| transport.pending() == 30).await;

    for _ in 0..30 {
        assert!(transport.complete_next(200));
    }
    for handle in handles {
        let response = handle.await.unwrap().unwrap();
        response.close();
    }
}
