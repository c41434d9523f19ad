use meter_protocol::frame::{mbus_ack, mbus_short_frame};
use meter_protocol::{Link, ProtocolError, ReadOutcome, RequestSpec, TcpLink, execute};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    (listener, port)
}

#[tokio::test]
async fn exchange_over_loopback_with_echo() {
    let (listener, port) = listener().await;
    let request = mbus_short_frame(0x40, 0x01);

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut buffer = [0u8; 5];
        socket.read_exact(&mut buffer).await.expect("read request");
        // 串口服务器回显请求后再给出确认
        socket.write_all(&buffer).await.expect("echo");
        socket.write_all(&[0xE5]).await.expect("ack");
        buffer
    });

    let mut link = TcpLink::new("127.0.0.1", port, Duration::from_secs(2));
    let spec = RequestSpec::new(request)
        .with_validator(mbus_ack)
        .with_read_timeout(Duration::from_millis(500));
    let response = execute(&mut link, &spec).await.expect("exchange");
    assert_eq!(response, vec![0xE5]);

    let received = server.await.expect("server");
    assert_eq!(received, request);

    // 对端可能已关闭，关闭结果不影响状态
    link.close().await.ok();
    assert!(!link.is_connected());
}

#[tokio::test]
async fn double_connect_is_rejected() {
    let (listener, port) = listener().await;
    let _server = tokio::spawn(async move {
        let _ = listener.accept().await;
        tokio::time::sleep(Duration::from_secs(1)).await;
    });

    let mut link = TcpLink::new("127.0.0.1", port, Duration::from_secs(2));
    link.connect().await.expect("connect");
    assert!(link.is_connected());
    let err = link.connect().await.expect_err("second connect");
    assert!(matches!(err, ProtocolError::Connection(_)));
    link.close().await.expect("close");
}

#[tokio::test]
async fn connect_timeout_is_connection_error() {
    // 零时限下名称解析尚未完成即超时
    let mut link = TcpLink::new("localhost", 9, Duration::ZERO);
    let err = link.connect().await.expect_err("dial timed out");
    assert!(matches!(err, ProtocolError::Connection(message) if message.ends_with("timed out")));
    assert!(!link.is_connected());
}

#[tokio::test]
async fn close_is_idempotent() {
    let mut link = TcpLink::new("127.0.0.1", 9, Duration::from_secs(1));
    link.close().await.expect("close disconnected");
    link.close().await.expect("close again");
    assert!(!link.is_connected());
}

#[tokio::test]
async fn read_classifies_timeout_and_peer_close() {
    let (listener, port) = listener().await;
    let (release, wait) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.expect("accept");
        let _ = wait.await;
        drop(socket);
    });

    let mut link = TcpLink::new("127.0.0.1", port, Duration::from_secs(2));
    link.connect().await.expect("connect");
    let mut buffer = [0u8; 16];

    let outcome = link.read(&mut buffer, Duration::from_millis(100)).await;
    assert!(matches!(outcome, ReadOutcome::Timeout));

    release.send(()).expect("release");
    server.await.expect("server");
    let outcome = link.read(&mut buffer, Duration::from_secs(2)).await;
    assert!(matches!(
        outcome,
        ReadOutcome::StreamClosed | ReadOutcome::Other(_)
    ));

    link.close().await.ok();
    let outcome = link.read(&mut buffer, Duration::from_millis(10)).await;
    assert!(matches!(outcome, ReadOutcome::StreamClosed));
}

#[tokio::test]
async fn write_without_connection_fails() {
    let mut link = TcpLink::new("127.0.0.1", 9, Duration::from_secs(1));
    let err = link
        .write(&[0x10], Duration::from_millis(100))
        .await
        .expect_err("not connected");
    assert!(matches!(err, ProtocolError::Connection(_)));
}
