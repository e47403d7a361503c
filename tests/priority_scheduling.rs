//! End-to-end check that the up-pump picks streams by neediness (queue
//! depth) rather than insertion order, exercising `StreamGroup` and
//! `PriorityTracker` together instead of the tracker in isolation.

mod common;

use std::time::Duration;

use bufferedskystream::{GroupConfig, HttpRemoteStream, StreamEvent, StreamGroup};
use common::fake_pool;
use std::sync::Arc;

#[tokio::test]
async fn busier_stream_is_serviced_before_a_quieter_one() {
    let pool = fake_pool(1, 1);
    let group = StreamGroup::new(pool.clone(), GroupConfig { max_block_size: 128 });

    let busy = Arc::new(HttpRemoteStream::open_or_create(pool.clone(), None).unwrap());
    let busy_index = group.add(busy).await.unwrap();
    let quiet = Arc::new(HttpRemoteStream::open_or_create(pool.clone(), None).unwrap());
    let quiet_index = group.add(quiet).await.unwrap();

    let mut events = group.subscribe();

    // Neither call blocks (the cap is well above either payload), so both
    // priorities are registered before the up-pump's spawned task gets a
    // chance to run its first cycle.
    group.queue_local_up(busy_index, &[0u8; 64]).await.unwrap();
    group.queue_local_up(quiet_index, &[0u8; 4]).await.unwrap();

    let mut order = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while order.len() < 2 {
            if let Ok(StreamEvent::Uploaded { index, .. }) = events.recv().await {
                if !order.contains(&index) {
                    order.push(index);
                }
            }
        }
    })
    .await
    .expect("both streams should flush");

    assert_eq!(
        order,
        vec![busy_index, quiet_index],
        "the deeper upload queue should be serviced first"
    );

    group.shutdown().await;
}
