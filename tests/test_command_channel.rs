//! Command queue behaviour across producer tasks

use mz2mqtt::bridge::CommandChannel;
use mz2mqtt::protocol::RawCommand;

#[tokio::test]
async fn test_each_producer_keeps_its_order() {
    let mut channel = CommandChannel::new();

    let producers: Vec<_> = ["A", "B", "C"]
        .into_iter()
        .map(|name| {
            let sender = channel.sender();
            tokio::spawn(async move {
                for i in 0..50 {
                    sender
                        .enqueue(RawCommand::new(format!("base/SET/{name}/refresh"), i.to_string()))
                        .unwrap();
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    futures::future::join_all(producers).await;

    let drained = channel.try_dequeue_all();
    assert_eq!(drained.len(), 150);

    for name in ["A", "B", "C"] {
        let topic = format!("base/SET/{name}/refresh");
        let sequence: Vec<u32> = drained
            .iter()
            .filter(|c| c.topic == topic)
            .map(|c| c.payload.parse().unwrap())
            .collect();
        assert_eq!(sequence, (0..50).collect::<Vec<u32>>());
    }
}

#[test]
fn test_drain_is_non_blocking_and_empties_queue() {
    let mut channel = CommandChannel::new();
    assert!(channel.try_dequeue_all().is_empty());

    channel
        .sender()
        .enqueue(RawCommand::new("base/SET/V/refresh", ""))
        .unwrap();
    assert_eq!(channel.try_dequeue_all().len(), 1);
    assert!(channel.try_dequeue_all().is_empty());
}

#[test]
fn test_enqueue_after_loop_is_gone_fails() {
    let channel = CommandChannel::new();
    let sender = channel.sender();
    drop(channel);

    assert!(sender.is_closed());
    assert!(sender.enqueue(RawCommand::new("base/SET/V/refresh", "")).is_err());
}
