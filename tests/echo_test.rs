//! End-to-end echo tests over loopback sockets.

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio_tungstenite::tungstenite::Message;

use echo_server::observability::Transport;

mod common;
use common::{read_response, read_until_closed, TestServer, STEP};

#[tokio::test]
async fn raw_tcp_echoes_bytes_in_order() {
    let server = TestServer::start().await;
    let mut stream = TcpStream::connect(server.tcp_addr()).await.unwrap();

    stream.write_all(b"hello").await.unwrap();
    let mut buf = [0u8; 5];
    tokio::time::timeout(STEP, stream.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"hello");

    drop(stream);
    server.stop().await;
}

#[tokio::test]
async fn raw_tcp_large_payload_round_trips() {
    let server = TestServer::start().await;
    let stream = TcpStream::connect(server.tcp_addr()).await.unwrap();
    let (mut reader, mut writer) = stream.into_split();

    let payload: Vec<u8> = (0..256 * 1024).map(|i| (i % 251) as u8).collect();
    let expected = payload.clone();
    let writing = tokio::spawn(async move {
        writer.write_all(&payload).await.unwrap();
        writer.shutdown().await.unwrap();
    });

    let mut echoed = Vec::new();
    tokio::time::timeout(STEP, reader.read_to_end(&mut echoed))
        .await
        .unwrap()
        .unwrap();
    writing.await.unwrap();
    assert_eq!(echoed, expected);

    server.stop().await;
}

#[tokio::test]
async fn concurrent_raw_sessions_are_independent() {
    let server = TestServer::start().await;
    let mut a = TcpStream::connect(server.tcp_addr()).await.unwrap();
    let mut b = TcpStream::connect(server.tcp_addr()).await.unwrap();

    a.write_all(b"from-a").await.unwrap();
    b.write_all(b"from-b").await.unwrap();

    let mut buf = [0u8; 6];
    b.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"from-b");
    a.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"from-a");

    drop((a, b));
    server.stop().await;
}

#[tokio::test]
async fn udp_replies_to_sender() {
    let server = TestServer::start().await;
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    socket.send_to(b"datagram", server.udp_addr()).await.unwrap();
    let mut buf = [0u8; 64];
    let (n, from) = tokio::time::timeout(STEP, socket.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..n], b"datagram");
    assert_eq!(from, server.udp_addr());
    assert_eq!(server.recorder.for_transport(Transport::Udp).len(), 1);

    server.stop().await;
}

#[tokio::test]
async fn http_keep_alive_serves_two_requests_on_one_connection() {
    let server = TestServer::start().await;
    let mut stream = TcpStream::connect(server.http_addr()).await.unwrap();

    stream
        .write_all(b"POST /a HTTP/1.1\r\nHost: test\r\nContent-Length: 5\r\n\r\nfirst")
        .await
        .unwrap();
    let first = read_response(&mut stream).await;
    assert!(first.head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(first.header("content-type"), Some("text/plain"));
    assert_eq!(first.header("connection"), Some("keep-alive"));
    assert!(first.header("server").is_some());
    assert_eq!(first.body, b"first");

    stream
        .write_all(b"POST /b HTTP/1.1\r\nHost: test\r\nContent-Length: 6\r\n\r\nsecond")
        .await
        .unwrap();
    let second = read_response(&mut stream).await;
    assert_eq!(second.body, b"second");
    assert_eq!(server.recorder.for_transport(Transport::Http).len(), 2);

    drop(stream);
    server.stop().await;
}

#[tokio::test]
async fn http_connection_close_ends_session() {
    let server = TestServer::start().await;
    let mut stream = TcpStream::connect(server.http_addr()).await.unwrap();

    stream
        .write_all(b"POST / HTTP/1.1\r\nContent-Length: 3\r\nConnection: close\r\n\r\nbye")
        .await
        .unwrap();
    let response = read_response(&mut stream).await;
    assert_eq!(response.header("connection"), Some("close"));
    assert_eq!(response.body, b"bye");
    assert!(read_until_closed(&mut stream).await.is_empty());

    server.stop().await;
}

#[tokio::test]
async fn http_chunked_request_is_echoed() {
    let server = TestServer::start().await;
    let mut stream = TcpStream::connect(server.http_addr()).await.unwrap();

    stream
        .write_all(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n")
        .await
        .unwrap();
    let response = read_response(&mut stream).await;
    assert_eq!(response.header("content-length"), Some("9"));
    assert_eq!(response.body, b"Wikipedia");

    drop(stream);
    server.stop().await;
}

#[tokio::test]
async fn http_client_gets_its_body_back() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{}/echo", server.http_addr()))
        .body("hello over http")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/plain"
    );
    assert_eq!(response.text().await.unwrap(), "hello over http");

    let empty = client
        .get(format!("http://{}/", server.http_addr()))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.text().await.unwrap(), "");

    drop(client);
    server.stop().await;
}

#[tokio::test]
async fn malformed_http_is_closed_without_response() {
    let server = TestServer::start().await;
    let mut stream = TcpStream::connect(server.http_addr()).await.unwrap();

    stream.write_all(b"\x00\x01 not http at all\r\n\r\n").await.unwrap();
    assert!(read_until_closed(&mut stream).await.is_empty());
    assert!(server.recorder.events().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn websocket_echoes_text_and_binary() {
    let server = TestServer::start().await;
    let (mut ws, response) = tokio_tungstenite::connect_async(format!("ws://{}/ws", server.http_addr()))
        .await
        .unwrap();
    assert_eq!(response.status(), 101);

    ws.send(Message::text("hello websocket")).await.unwrap();
    let reply = tokio::time::timeout(STEP, ws.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(reply, Message::text("hello websocket"));

    ws.send(Message::binary(vec![1u8, 2, 3])).await.unwrap();
    let reply = tokio::time::timeout(STEP, ws.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(reply, Message::binary(vec![1u8, 2, 3]));

    ws.close(None).await.unwrap();
    let reply = tokio::time::timeout(STEP, ws.next()).await.unwrap();
    assert!(matches!(reply, Some(Ok(Message::Close(_)))), "{reply:?}");
    assert!(tokio::time::timeout(STEP, ws.next()).await.unwrap().is_none());
    assert_eq!(server.recorder.for_transport(Transport::WebSocket).len(), 2);

    server.stop().await;
}

#[tokio::test]
async fn combined_port_routes_each_protocol() {
    let server = TestServer::start().await;

    // Raw bytes
    let mut raw = TcpStream::connect(server.combined_addr()).await.unwrap();
    raw.write_all(b"hello\n").await.unwrap();
    let mut buf = [0u8; 6];
    tokio::time::timeout(STEP, raw.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"hello\n");

    // HTTP
    let mut http = TcpStream::connect(server.combined_addr()).await.unwrap();
    http.write_all(b"POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\nbody")
        .await
        .unwrap();
    let response = read_response(&mut http).await;
    assert_eq!(response.body, b"body");

    // WebSocket
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/", server.combined_addr()))
        .await
        .unwrap();
    ws.send(Message::text("sniffed")).await.unwrap();
    let reply = tokio::time::timeout(STEP, ws.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(reply, Message::text("sniffed"));

    assert_eq!(server.recorder.for_transport(Transport::Tcp).len(), 1);
    assert_eq!(server.recorder.for_transport(Transport::Http).len(), 1);

    drop((raw, http, ws));
    server.stop().await;
}
