use std::time::Duration;

use futures::StreamExt;
use i2c_bus::mock::{MockBus, MockDevice, Transaction};
use i2c_bus::{BusSession, Cause, Error, SharedSession};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const NODE: &str = "/dev/i2c-1";

fn shared(devices: &[(u8, MockDevice)]) -> (SharedSession<MockBus>, MockBus) {
    let bus = MockBus::new(NODE);
    for (address, device) in devices {
        bus.attach(*address, device.clone());
    }
    let session = BusSession::open_with(bus.clone(), NODE).unwrap();
    (SharedSession::new(session), bus)
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn async_operations_reach_the_device() {
    let (session, bus) = shared(&[(0x50, MockDevice::new())]);

    session.set_address(0x50).await.unwrap();
    session.write_byte(0x42).await.unwrap();
    assert_eq!(session.read_byte().await.unwrap(), 0x42);

    session.write_block(0x10, vec![1, 2, 3]).await.unwrap();
    assert_eq!(session.read_block(0x10, 3).await.unwrap(), vec![1, 2, 3]);

    session.write_word(0x20, 0xABCD).await.unwrap();
    assert_eq!(bus.register(0x50, 0x20), Some(vec![0xCD, 0xAB]));

    session.write([7u8, 8]).await.unwrap();
    assert_eq!(session.read(2).await.unwrap(), vec![7, 8]);
}

#[tokio::test]
async fn scan_through_shared_session() {
    let (session, _bus) =
        shared(&[(0x1D, MockDevice::new()), (0x68, MockDevice::new())]);
    session.set_address(0x68).await.unwrap();

    let result = session.scan().await.unwrap();

    let found: Vec<u8> = result.present().map(u8::from).collect();
    assert_eq!(found, vec![0x1D, 0x68]);
    assert_eq!(
        session.current_address().await.unwrap().map(u8::from),
        Some(0x68)
    );
}

#[tokio::test]
async fn close_and_reopen() {
    let (session, bus) = shared(&[]);
    session.close().await.unwrap();
    assert!(!session.is_open().await.unwrap());
    assert_eq!(bus.open_handles(), 0);

    assert!(matches!(
        session.read_byte().await,
        Err(Error::ReadFailed(Cause::NotOpen))
    ));
    assert!(matches!(
        session.open("/dev/i2c-9").await,
        Err(Error::OpenFailed { .. })
    ));

    session.open(NODE).await.unwrap();
    assert!(session.is_open().await.unwrap());
    assert_eq!(bus.open_handles(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transactions_do_not_interleave() {
    let (session, bus) =
        shared(&[(0x20, MockDevice::new()), (0x21, MockDevice::new())]);

    let tasks: Vec<_> = [0x20u8, 0x21]
        .into_iter()
        .map(|address| {
            let session = session.clone();
            tokio::spawn(async move {
                for value in 0..50u8 {
                    session
                        .transaction(move |s| {
                            s.set_address(address)?;
                            s.write_byte(value)?;
                            s.read_byte()
                        })
                        .await
                        .unwrap();
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let log = bus.transactions();
    assert_eq!(log.len(), 2 * 50 * 3);
    for step in log.chunks(3) {
        let address = step[0].address();
        assert_eq!(step[0], Transaction::Select(address));
        assert!(matches!(
            step[1],
            Transaction::WriteByte { address: a, .. } if a == address
        ));
        assert_eq!(step[2], Transaction::ReadByte(address));
    }
}

// ---------------------------------------------------------------------------
// Polling stream
// ---------------------------------------------------------------------------

#[tokio::test]
async fn poll_stream_ends_when_closed_elsewhere() {
    let device = MockDevice::new().with_register(0x10, &[4, 2]);
    let (session, bus) = shared(&[(0x29, device)]);
    session.set_address(0x29).await.unwrap();

    let delay = Duration::from_millis(10);
    let poller = {
        let session = session.clone();
        tokio::spawn(async move {
            session.poll_block(0x10, 2, delay).collect::<Vec<_>>().await
        })
    };

    tokio::time::sleep(delay * 4).await;
    session.close().await.unwrap();

    let samples = tokio::time::timeout(Duration::from_secs(5), poller)
        .await
        .unwrap()
        .unwrap();
    assert!(samples.len() >= 2, "got {} samples", samples.len());
    assert!(samples.iter().all(|s| s.as_ref().unwrap() == &vec![4, 2]));

    let reads = bus.block_reads();
    tokio::time::sleep(delay * 3).await;
    assert_eq!(bus.block_reads(), reads);
}

#[tokio::test]
async fn poll_stream_reports_failures_and_continues() {
    let device =
        MockDevice::new().with_register(0x10, &[1]).with_failing_block_reads(2);
    let (session, _bus) = shared(&[(0x29, device)]);
    session.set_address(0x29).await.unwrap();

    let samples: Vec<_> = session
        .poll_block(0x10, 1, Duration::from_millis(1))
        .take(3)
        .collect()
        .await;

    assert!(matches!(samples[0], Err(Error::ReadFailed(Cause::Os(_)))));
    assert!(matches!(samples[1], Err(Error::ReadFailed(Cause::Os(_)))));
    assert_eq!(samples[2].as_ref().unwrap(), &vec![1]);
}

#[tokio::test]
async fn dropping_the_stream_stops_polling() {
    let device = MockDevice::new().with_register(0x10, &[1]);
    let (session, bus) = shared(&[(0x29, device)]);
    session.set_address(0x29).await.unwrap();

    let delay = Duration::from_millis(5);
    let first: Vec<_> =
        session.poll_block(0x10, 1, delay).take(2).collect().await;
    assert_eq!(first.len(), 2);

    tokio::time::sleep(delay * 4).await;
    assert_eq!(bus.block_reads(), 2);
    assert!(session.is_open().await.unwrap());
}

#[tokio::test]
async fn poll_on_closed_session_is_empty() {
    let (session, bus) = shared(&[(0x29, MockDevice::new())]);
    session.close().await.unwrap();
    let samples: Vec<_> =
        session.poll_block(0x10, 1, Duration::from_millis(1)).collect().await;
    assert!(samples.is_empty());
    assert_eq!(bus.block_reads(), 0);
}

#[tokio::test]
async fn poll_stream_with_bad_length_reports_once() {
    let (session, bus) = shared(&[(0x29, MockDevice::new())]);
    session.set_address(0x29).await.unwrap();

    let samples: Vec<_> =
        session.poll_block(0x10, 0, Duration::from_millis(1)).collect().await;

    assert_eq!(samples.len(), 1);
    assert!(matches!(
        samples[0],
        Err(Error::ReadFailed(Cause::InvalidLength { len: 0, .. }))
    ));
    assert_eq!(bus.block_reads(), 0);
}
