//! A portal failing roughly half the time must still yield a correct byte
//! stream — the pool's retry loop absorbs the failures, the scheduler never
//! sees them.

mod common;

use std::sync::Arc;
use std::time::Duration;

use bufferedskystream::{GroupConfig, HttpRemoteStream, StreamEvent, StreamGroup};
use common::flaky_pool;

#[tokio::test]
async fn round_trips_correctly_despite_a_flaky_portal() {
    let pool = flaky_pool(2, 2);
    let group = StreamGroup::new(pool.clone(), GroupConfig { max_block_size: 8 });

    let remote = Arc::new(HttpRemoteStream::open_or_create(pool.clone(), None).unwrap());
    let index = group.add(remote).await.unwrap();
    let mut events = group.subscribe();

    let payload: Vec<u8> = (0..96u8).cycle().take(160).collect();
    group.queue_local_up(index, &payload).await.unwrap();

    let mut seen = 0u64;
    tokio::time::timeout(Duration::from_secs(20), async {
        while seen < payload.len() as u64 {
            if let Ok(StreamEvent::Uploaded { index: i, bytes }) = events.recv().await {
                if i == index {
                    seen += bytes;
                }
            }
        }
    })
    .await
    .expect("upload should eventually complete despite injected failures");

    let read_back = group
        .xfer_local_down(index, 0, payload.len() as u64, None)
        .await
        .unwrap();
    assert_eq!(read_back, payload);

    group.shutdown().await;
}
