use embedded_io::Error as _;
use embedded_io::{Read as SyncRead, Write as SyncWrite};
use embedded_io_async::{Read, Write};
use ringchan::{Capabilities, CancelToken, ChannelConfig, IdGen, RingChannel, RingError, WakeQueueArc};

fn make_channel(capacity: usize) -> RingChannel {
    let queue = WakeQueueArc::new();
    let id_gen = IdGen::new();
    RingChannel::new(
        ChannelConfig {
            items_per_channel: capacity,
            item_size: 1,
        },
        queue,
        &id_gen,
        "io-traits",
    )
}

#[tokio::test]
async fn sessions_implement_async_read_write() {
    let chan = make_channel(16);
    let mut writer = chan.open(Capabilities::Write, CancelToken::new()).unwrap();
    let mut reader = chan.open(Capabilities::Read, CancelToken::new()).unwrap();

    let n = Write::write(&mut writer, b"trait io").await.unwrap();
    assert_eq!(n, 8);
    Write::flush(&mut writer).await.unwrap();

    let mut buf = [0u8; 16];
    let n = Read::read(&mut reader, &mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"trait io");
}

#[tokio::test]
async fn async_read_sees_eof_after_writer_close() {
    let chan = make_channel(16);
    let writer = chan.open(Capabilities::Write, CancelToken::new()).unwrap();
    let mut reader = chan.open(Capabilities::Read, CancelToken::new()).unwrap();

    writer.close().unwrap();

    let mut buf = [0u8; 4];
    assert_eq!(Read::read(&mut reader, &mut buf).await.unwrap(), 0);
}

#[test]
fn sessions_implement_sync_read_write() {
    let chan = make_channel(8);
    let mut writer = chan.open(Capabilities::Write, CancelToken::new()).unwrap();
    let mut reader = chan.open(Capabilities::Read, CancelToken::new()).unwrap();

    let n = SyncWrite::write(&mut writer, b"sync").unwrap();
    assert_eq!(n, 4);
    SyncWrite::flush(&mut writer).unwrap();

    let mut buf = [0u8; 8];
    let n = SyncRead::read(&mut reader, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"sync");

    // The sync surface never suspends: an empty buffer with a writer
    // still open reports would-block instead of parking.
    assert_eq!(
        SyncRead::read(&mut reader, &mut buf),
        Err(RingError::WouldBlock)
    );
}

#[test]
fn sync_write_on_full_buffer_would_block() {
    let chan = make_channel(4);
    let mut writer = chan.open(Capabilities::Write, CancelToken::new()).unwrap();
    let _reader = chan.open(Capabilities::Read, CancelToken::new()).unwrap();

    assert_eq!(SyncWrite::write(&mut writer, b"abc").unwrap(), 3);
    assert_eq!(
        SyncWrite::write(&mut writer, b"d"),
        Err(RingError::WouldBlock)
    );
    assert_eq!(chan.buffered(), 3);
}

#[test]
fn error_kinds_map_to_embedded_io() {
    assert_eq!(
        RingError::Interrupted.kind(),
        embedded_io::ErrorKind::Interrupted
    );
    assert_eq!(
        RingError::OutOfMemory.kind(),
        embedded_io::ErrorKind::OutOfMemory
    );
    assert_eq!(
        RingError::BrokenPipe.kind(),
        embedded_io::ErrorKind::BrokenPipe
    );
    assert_eq!(
        RingError::NotOpenForRead.kind(),
        embedded_io::ErrorKind::PermissionDenied
    );
}
