//! Integration tests for the recognizer transport channel against a local
//! WebSocket server.

use captiond_transport::{ChannelError, ChannelEvent, ChannelState, TransportChannel};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn streams_frames_out_and_events_in() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        // First outbound message must be the binary PCM frame, S16LE.
        match ws.next().await.unwrap().unwrap() {
            Message::Binary(bytes) => assert_eq!(bytes, vec![0x01, 0x00, 0xfe, 0xff]),
            other => panic!("expected binary frame, got {:?}", other),
        }

        ws.send(Message::Text(
            r#"{"text":"witaj swet","listen":"false"}"#.to_string(),
        ))
        .await
        .unwrap();

        // Session end: eof control message precedes the close handshake.
        let eof = ws.next().await.unwrap().unwrap();
        assert_eq!(eof.into_text().unwrap(), r#"{"eof":1}"#);

        while let Some(message) = ws.next().await {
            if matches!(message, Ok(Message::Close(_)) | Err(_)) {
                break;
            }
        }
    });

    let (channel, mut events) = TransportChannel::connect(&format!("ws://{}", addr))
        .await
        .unwrap();

    assert!(matches!(events.recv().await, Some(ChannelEvent::Open)));
    assert_eq!(channel.state().await, ChannelState::Open);

    channel.send_frame(&[1, -2]).await.unwrap();

    match events.recv().await {
        Some(ChannelEvent::Message(raw)) => assert!(raw.contains("witaj swet")),
        other => panic!("expected transcript message, got {:?}", other),
    }

    channel.close().await.unwrap();
    assert_eq!(channel.state().await, ChannelState::Closed);

    // Sending after close is a caller error, not a silent drop.
    match channel.send_frame(&[0]).await {
        Err(ChannelError::NotOpen(state)) => assert_eq!(state, ChannelState::Closed),
        other => panic!("expected NotOpen error, got {:?}", other),
    }

    server.await.unwrap();
}

#[tokio::test]
async fn remote_close_surfaces_closed_event() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::Close(None)).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let (channel, mut events) = TransportChannel::connect(&format!("ws://{}", addr))
        .await
        .unwrap();

    assert!(matches!(events.recv().await, Some(ChannelEvent::Open)));
    assert!(matches!(events.recv().await, Some(ChannelEvent::Closed)));
    assert_eq!(channel.state().await, ChannelState::Closed);

    server.await.unwrap();
}

#[tokio::test]
async fn connect_failure_is_reported() {
    // Discard port; nothing listens there.
    let result = TransportChannel::connect("ws://127.0.0.1:9/").await;
    assert!(matches!(result, Err(ChannelError::Connect(_))));
}
