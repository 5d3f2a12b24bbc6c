use ringchan::{Capabilities, CancelToken, ChannelPool, IoMode, PoolConfig};

#[test]
fn pool_is_sized_from_config() {
    let pool = ChannelPool::new(PoolConfig {
        nr_channels: 3,
        items_per_channel: 4,
        item_size: 2,
    });

    assert_eq!(pool.len(), 3);
    assert!(!pool.is_empty());
    assert_eq!(pool.get(0).unwrap().capacity(), 8);
    assert!(pool.get(3).is_none());
}

#[test]
fn default_config_matches_module_defaults() {
    let config = PoolConfig::default();
    assert_eq!(config.nr_channels, 4);
    assert_eq!(config.items_per_channel * config.item_size, 1280);
}

#[tokio::test]
async fn channels_are_independent() {
    let pool = ChannelPool::new(PoolConfig {
        nr_channels: 2,
        items_per_channel: 16,
        item_size: 1,
    });

    let first = pool.open(0, Capabilities::ReadWrite, CancelToken::new()).unwrap();
    let second = pool.open(1, Capabilities::ReadWrite, CancelToken::new()).unwrap();

    first.write(b"one", IoMode::Blocking).await.unwrap();
    assert_eq!(pool.get(0).unwrap().buffered(), 3);
    assert_eq!(pool.get(1).unwrap().buffered(), 0);

    second.write(b"two", IoMode::Blocking).await.unwrap();
    let mut buf = [0u8; 8];
    let n = second.read(&mut buf, IoMode::Blocking).await.unwrap();
    assert_eq!(&buf[..n], b"two");

    let n = first.read(&mut buf, IoMode::Blocking).await.unwrap();
    assert_eq!(&buf[..n], b"one");
}

#[tokio::test]
async fn sessions_route_to_their_channel() {
    let pool = ChannelPool::new(PoolConfig {
        nr_channels: 2,
        items_per_channel: 16,
        item_size: 1,
    });

    let writer = pool.open(1, Capabilities::Write, CancelToken::new()).unwrap();
    let reader = pool.open(1, Capabilities::Read, CancelToken::new()).unwrap();

    writer.write(b"routed", IoMode::Blocking).await.unwrap();
    let mut buf = [0u8; 8];
    let n = reader.read(&mut buf, IoMode::Blocking).await.unwrap();
    assert_eq!(&buf[..n], b"routed");

    // Channel 0 was never opened, so it stays unallocated.
    assert!(!pool.get(0).unwrap().is_allocated());
    assert!(pool.get(1).unwrap().is_allocated());
}

#[test]
#[should_panic(expected = "no channel at index")]
fn opening_an_unknown_index_panics() {
    let pool = ChannelPool::new(PoolConfig {
        nr_channels: 1,
        items_per_channel: 4,
        item_size: 1,
    });
    let _ = pool.open(5, Capabilities::Read, CancelToken::new());
}
