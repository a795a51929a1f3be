use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use lcg_core::wire::MAX_MESSAGE_SIZE;
use lcg_core::{GatewayCodec, GatewayMessage};
use lcg_services::{
    receive_message, send_bytes, send_message, BufferPool, FrameSink, Received, TransportError,
};

use crate::*;

#[tokio::test]
async fn large_message_crosses_loopback_intact() {
    let mut link = loopback().await.unwrap();
    let pool = BufferPool::new();
    let cancel = CancellationToken::new();

    let payload: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
    let message = GatewayMessage::Data {
        channel: 9,
        payload: Bytes::from(payload),
    };

    let (sent, received) = tokio::join!(
        send_message(&message, &GatewayCodec, &mut link.client_tx, &pool, &cancel),
        receive_message(&mut link.server_rx, &GatewayCodec, &pool, &cancel),
    );
    sent.unwrap();
    assert_eq!(received.unwrap(), Received::Message(message));
    assert_eq!(pool.stats().outstanding(), 0);
}

#[tokio::test]
async fn size_boundary_is_enforced_on_accumulated_bytes() {
    let mut link = loopback().await.unwrap();
    let pool = BufferPool::new();
    let cancel = CancellationToken::new();

    let exact = vec![7u8; MAX_MESSAGE_SIZE];
    let (sent, received) = tokio::join!(
        send_bytes(&exact, &mut link.client_tx, &cancel),
        receive_message(&mut link.server_rx, &RawDecoder, &pool, &cancel),
    );
    sent.unwrap();
    match received.unwrap() {
        Received::Message(bytes) => assert_eq!(bytes.len(), MAX_MESSAGE_SIZE),
        Received::Closed => panic!("unexpected close"),
    }

    let over = vec![7u8; MAX_MESSAGE_SIZE + 1];
    let (sent, received) = tokio::join!(
        send_bytes(&over, &mut link.client_tx, &cancel),
        receive_message(&mut link.server_rx, &RawDecoder, &pool, &cancel),
    );
    sent.unwrap();
    assert!(matches!(
        received,
        Err(TransportError::MessageTooLarge { size, max }) if size == MAX_MESSAGE_SIZE + 1 && max == MAX_MESSAGE_SIZE
    ));
    assert_eq!(pool.stats().outstanding(), 0);
}

#[tokio::test]
async fn oversized_send_writes_nothing() {
    let mut link = loopback().await.unwrap();
    let pool = BufferPool::new();
    let cancel = CancellationToken::new();

    let huge = GatewayMessage::Data {
        channel: 1,
        payload: Bytes::from(vec![0u8; MAX_MESSAGE_SIZE]),
    };
    let err = send_message(&huge, &GatewayCodec, &mut link.client_tx, &pool, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::MessageTooLarge { .. }));

    // The next message on the wire is the small one.
    let ping = GatewayMessage::Ping { nonce: 3 };
    send_message(&ping, &GatewayCodec, &mut link.client_tx, &pool, &cancel)
        .await
        .unwrap();
    let received = receive_message(&mut link.server_rx, &GatewayCodec, &pool, &cancel)
        .await
        .unwrap();
    assert_eq!(received, Received::Message(ping));
}

#[tokio::test]
async fn both_directions_run_concurrently() {
    let link = loopback().await.unwrap();
    let Link {
        mut client_rx,
        mut client_tx,
        mut server_rx,
        mut server_tx,
    } = link;
    let pool = BufferPool::new();
    let cancel = CancellationToken::new();
    const COUNT: u64 = 50;

    let server = {
        let pool = pool.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let send = async {
                for nonce in 0..COUNT {
                    let msg = GatewayMessage::Data {
                        channel: 1,
                        payload: Bytes::from(vec![nonce as u8; 3000]),
                    };
                    send_message(&msg, &GatewayCodec, &mut server_tx, &pool, &cancel)
                        .await
                        .unwrap();
                }
            };
            let recv = async {
                for nonce in 0..COUNT {
                    let got = receive_message(&mut server_rx, &GatewayCodec, &pool, &cancel)
                        .await
                        .unwrap();
                    assert_eq!(got, Received::Message(GatewayMessage::Ping { nonce }));
                }
            };
            tokio::join!(send, recv);
        })
    };

    let send = async {
        for nonce in 0..COUNT {
            send_message(&GatewayMessage::Ping { nonce }, &GatewayCodec, &mut client_tx, &pool, &cancel)
                .await
                .unwrap();
        }
    };
    let recv = async {
        for nonce in 0..COUNT {
            match receive_message(&mut client_rx, &GatewayCodec, &pool, &cancel)
                .await
                .unwrap()
            {
                Received::Message(GatewayMessage::Data { payload, .. }) => {
                    assert_eq!(payload.len(), 3000);
                    assert!(payload.iter().all(|&b| b == nonce as u8));
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    };
    tokio::join!(send, recv);
    server.await.unwrap();
    assert_eq!(pool.stats().outstanding(), 0);
}

#[tokio::test]
async fn close_handshake_ends_both_receivers() {
    let mut link = loopback().await.unwrap();
    let pool = BufferPool::new();
    let cancel = CancellationToken::new();

    link.client_tx.send_close("client done").await.unwrap();

    let server = receive_message(&mut link.server_rx, &GatewayCodec, &pool, &cancel)
        .await
        .unwrap();
    assert_eq!(server, Received::Closed);

    // The server answered; the client sees that close next.
    let client = receive_message(&mut link.client_rx, &GatewayCodec, &pool, &cancel)
        .await
        .unwrap();
    assert_eq!(client, Received::Closed);

    let err = send_message(
        &GatewayMessage::Ping { nonce: 1 },
        &GatewayCodec,
        &mut link.server_tx,
        &pool,
        &cancel,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, TransportError::Io(_)));
}

#[tokio::test]
async fn cancellation_aborts_a_blocked_receive() {
    let mut link = loopback().await.unwrap();
    let pool = BufferPool::new();
    let cancel = CancellationToken::new();

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            cancel.cancel();
        })
    };

    let err = receive_message(&mut link.server_rx, &GatewayCodec, &pool, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Cancelled));
    canceller.await.unwrap();
    assert_eq!(pool.stats().outstanding(), 0);
}
