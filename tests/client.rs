//! The scoped client helper: timeouts, rejection and error unification.

mod harness;

use std::time::{Duration, Instant};

use harness::{RawServer, TestServer, echo};
use wsnursery::{
    ConnectOptions, Error, Message, Nursery, WebSocketRequest, connect_websocket,
    connect_websocket_url, open_websocket, open_websocket_url,
};

#[tokio::test]
async fn test_open_websocket_echo() {
    let server = TestServer::spawn(echo).await;

    let reply = open_websocket_url(&server.url("/echo"), &ConnectOptions::default(), |ws| async move {
        assert_eq!(ws.path(), "/echo");
        ws.send_message("hello").await?;
        ws.get_message().await
    })
    .await
    .unwrap();
    assert_eq!(reply, Message::text("hello"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_connection_is_closed_after_body() {
    let server = TestServer::spawn(echo).await;

    let ws = open_websocket(
        "127.0.0.1",
        server.port(),
        "/",
        false,
        &ConnectOptions::default(),
        |ws| async move { Ok(ws) },
    )
    .await
    .unwrap();
    assert_eq!(ws.closed().unwrap().code(), 1000);
    assert!(matches!(
        ws.send_message("late").await,
        Err(Error::ConnectionClosed(_))
    ));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_connect_timeout() {
    // Accepts TCP but never answers the opening handshake.
    let raw = RawServer::bind().await;
    let port = raw.port();
    let _peer = tokio::spawn(async move {
        let peer = raw.accept_silent().await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(peer);
    });

    let options = ConnectOptions::default().with_connect_timeout(Duration::from_millis(10));
    let started = Instant::now();
    let result = open_websocket("127.0.0.1", port, "/", false, &options, |_ws| async {
        Ok(())
    })
    .await;
    assert!(matches!(result, Err(Error::ConnectionTimeout)), "{result:?}");
    assert!(result.unwrap_err().is_handshake_error());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_connect_refused_is_handshake_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let result = open_websocket("127.0.0.1", port, "/", false, &ConnectOptions::default(), |_ws| async {
        Ok(())
    })
    .await;
    assert!(matches!(result, Err(Error::Handshake(_))), "{result:?}");
}

#[tokio::test]
async fn test_user_error_carries_disconnect_timeout() {
    // Completes the opening handshake, then ignores the close frame.
    let raw = RawServer::bind().await;
    let port = raw.port();
    let _peer = tokio::spawn(async move {
        let peer = raw.accept().await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(peer);
    });

    let options = ConnectOptions::default().with_disconnect_timeout(Duration::from_millis(100));
    let result: wsnursery::Result<()> = open_websocket("127.0.0.1", port, "/", false, &options, |_ws| async {
        Err(Error::Config("user failure".into()))
    })
    .await;

    let err = result.unwrap_err();
    assert!(matches!(err.primary(), Error::Config(msg) if msg == "user failure"));
    assert_eq!(err.context().len(), 1);
    assert!(matches!(err.context()[0], Error::DisconnectionTimeout));
}

#[tokio::test]
async fn test_user_error_carries_abnormal_closure() {
    // Completes the opening handshake, then vanishes.
    let raw = RawServer::bind().await;
    let port = raw.port();
    let peer = tokio::spawn(async move {
        let peer = raw.accept().await;
        drop(peer);
    });

    let result: wsnursery::Result<()> = open_websocket(
        "127.0.0.1",
        port,
        "/",
        false,
        &ConnectOptions::default(),
        |ws| async move {
            let closed = ws.get_message().await.unwrap_err();
            assert_eq!(closed.close_reason().unwrap().code(), 1006);
            Err(Error::Config("user failure".into()))
        },
    )
    .await;
    peer.await.unwrap();

    let err = result.unwrap_err();
    assert!(matches!(err.primary(), Error::Config(msg) if msg == "user failure"));
    assert_eq!(err.context().len(), 1);
    assert_eq!(err.context()[0].close_reason().unwrap().code(), 1006);
}

#[tokio::test]
async fn test_abnormal_closure_returned_by_body_is_not_duplicated() {
    let raw = RawServer::bind().await;
    let port = raw.port();
    let peer = tokio::spawn(async move {
        let peer = raw.accept().await;
        drop(peer);
    });

    let result: wsnursery::Result<Message> = open_websocket(
        "127.0.0.1",
        port,
        "/",
        false,
        &ConnectOptions::default(),
        |ws| async move { ws.get_message().await },
    )
    .await;
    peer.await.unwrap();

    let err = result.unwrap_err();
    assert!(err.context().is_empty(), "{err:?}");
    assert_eq!(err.close_reason().unwrap().code(), 1006);
}

#[tokio::test]
async fn test_user_error_alone_is_unchanged() {
    let server = TestServer::spawn(echo).await;

    let result: wsnursery::Result<()> = open_websocket(
        "127.0.0.1",
        server.port(),
        "/",
        false,
        &ConnectOptions::default(),
        |_ws| async { Err(Error::Protocol("bad reply".into())) },
    )
    .await;
    assert!(matches!(result, Err(Error::Protocol(msg)) if msg == "bad reply"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rejection_with_body() {
    let server = TestServer::spawn(|request: WebSocketRequest| async move {
        request
            .reject(403, vec![("X-Reason".into(), "denied".into())], Some(b"nope".to_vec()))
            .await
    })
    .await;

    let nursery = Nursery::new();
    let err = connect_websocket(&nursery, "127.0.0.1", server.port(), "/", false, &ConnectOptions::default())
        .await
        .unwrap_err();
    match err {
        Error::ConnectionRejected(rejection) => {
            assert_eq!(rejection.status_code, 403);
            assert_eq!(rejection.body.as_deref(), Some(&b"nope"[..]));
            assert!(
                rejection
                    .headers
                    .iter()
                    .any(|(name, value)| name.eq_ignore_ascii_case("x-reason") && value == "denied")
            );
        }
        other => panic!("expected rejection, got {other:?}"),
    }

    let result = open_websocket_url(&server.url("/"), &ConnectOptions::default(), |_ws| async {
        Ok(())
    })
    .await;
    assert!(matches!(result, Err(Error::ConnectionRejected(_))), "{result:?}");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_connect_websocket_url() {
    let server = TestServer::spawn(echo).await;
    let nursery = Nursery::new();

    let ws = connect_websocket_url(&nursery, &server.url("/chat?room=1"), &ConnectOptions::default())
        .await
        .unwrap();
    assert_eq!(ws.path(), "/chat?room=1");
    ws.send_message(vec![1u8, 2, 3]).await.unwrap();
    assert_eq!(ws.get_message().await.unwrap(), Message::binary(vec![1, 2, 3]));
    ws.close().await.unwrap();

    assert!(nursery.join().await.is_empty());
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_wss_against_plain_server_fails() {
    let server = TestServer::spawn(echo).await;
    let url = format!("wss://127.0.0.1:{}/", server.port());
    let options = ConnectOptions::default().with_connect_timeout(Duration::from_secs(1));
    let result = open_websocket_url(&url, &options, |_ws| async { Ok(()) }).await;
    assert!(result.is_err());
    server.shutdown().await.unwrap();
}
