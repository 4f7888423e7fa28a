//! End-to-end tests: public port, tunnel port, and agent working together
//! over real loopback sockets.

use burrow::agent::{request_descriptor, Supervisor};
use burrow::{AgentConfig, GatewayConfig, RunningServer, Server};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn start_gateway() -> RunningServer {
    let mut config = GatewayConfig::default();
    config.bind_address = "127.0.0.1".to_string();
    config.bind_port = 0;
    config.tunnel_port = 0;
    let server = Server::new(config).unwrap();
    server.start().await.unwrap()
}

/// Loopback HTTP server answering every request with the given body.
async fn spawn_local_http(body: &'static str) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let (mut conn, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let mut head = Vec::new();
                loop {
                    // crude head read; requests in these tests have no body
                    let n = match conn.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    head.extend_from_slice(&buf[..n]);
                    if !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        continue;
                    }
                    head.clear();
                    let resp = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    if conn.write_all(resp.as_bytes()).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    port
}

async fn start_agent(running: &RunningServer, local_port: u16, pool: usize) -> String {
    let descriptor = request_descriptor(&running.public_addr.to_string(), None, None)
        .await
        .unwrap();
    let id = descriptor.id.clone();
    // the test gateway binds an ephemeral tunnel port, so the descriptor's
    // advertised port (the configured one) is not dialable here
    let config = AgentConfig {
        gateway_host: "127.0.0.1".to_string(),
        tunnel_port: running.tunnel_addr.port(),
        local_port,
        id: Some(descriptor.id.clone()),
        token: descriptor.token.clone(),
        pool_size: pool.min(descriptor.max_conn_count),
    };
    let supervisor = Supervisor::new(config).unwrap();
    tokio::spawn(supervisor.run());
    id
}

/// One-shot GET with Connection: close; returns (status, body).
async fn http_get(addr: SocketAddr, path: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let req = format!(
        "GET {} HTTP/1.1\r\nHost: gw\r\nConnection: close\r\n\r\n",
        path
    );
    stream.write_all(req.as_bytes()).await.unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    let text = String::from_utf8_lossy(&out).to_string();
    let status: u16 = text
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let body = text
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_default();
    (status, body)
}

async fn wait_for_sockets(public: SocketAddr, id: &str, want: usize) -> bool {
    for _ in 0..100 {
        let (status, body) = http_get(public, &format!("/api/tunnels/{}/status", id)).await;
        if status == 200 {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&body) {
                if json["connected_sockets"].as_u64() == Some(want as u64) {
                    return true;
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_happy_path_proxy() {
    let running = start_gateway().await;
    let local = spawn_local_http("hello").await;
    let id = start_agent(&running, local, 2).await;
    assert!(wait_for_sockets(running.public_addr, &id, 2).await);

    let (status, body) = http_get(running.public_addr, &format!("/{}/", id)).await;
    assert_eq!(status, 200);
    assert_eq!(body, "hello");

    running.shutdown().await;
}

#[tokio::test]
async fn test_502_without_agent_endpoints() {
    let running = start_gateway().await;
    let descriptor = request_descriptor(&running.public_addr.to_string(), None, None)
        .await
        .unwrap();

    let (status, body) =
        http_get(running.public_addr, &format!("/{}/x", descriptor.id)).await;
    assert_eq!(status, 502);
    assert_eq!(body, "No available connections");

    running.shutdown().await;
}

#[tokio::test]
async fn test_unknown_tunnel_is_404() {
    let running = start_gateway().await;
    let (status, _) = http_get(running.public_addr, "/ghost/x").await;
    assert_eq!(status, 404);
    running.shutdown().await;
}

#[tokio::test]
async fn test_status_surfaces() {
    let running = start_gateway().await;
    let local = spawn_local_http("ok").await;
    let id = start_agent(&running, local, 1).await;
    assert!(wait_for_sockets(running.public_addr, &id, 1).await);

    let (status, body) = http_get(running.public_addr, "/api/status").await;
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["tunnels"], 1);
    assert_eq!(json["auth_enabled"], false);
    assert_eq!(
        json["tunnel_port"].as_u64().unwrap(),
        // the descriptor advertised the configured port; here the listener
        // bound an ephemeral one, so the config value (0) is echoed
        0
    );
    for key in ["alloc", "totalAlloc", "sys", "heapAlloc"] {
        assert!(json["mem"].get(key).is_some());
    }

    running.shutdown().await;
}

#[tokio::test]
async fn test_websocket_upgrade_end_to_end() {
    // loopback server that accepts the upgrade and echoes raw bytes
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let local_port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let (mut conn, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let mut head = Vec::new();
                loop {
                    let n = match conn.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    head.extend_from_slice(&buf[..n]);
                    if head.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                if conn
                    .write_all(b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\r\n")
                    .await
                    .is_err()
                {
                    return;
                }
                loop {
                    let n = match conn.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    if conn.write_all(&buf[..n]).await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    let running = start_gateway().await;
    let id = start_agent(&running, local_port, 2).await;
    assert!(wait_for_sockets(running.public_addr, &id, 2).await);

    let mut stream = TcpStream::connect(running.public_addr).await.unwrap();
    let req = format!(
        "GET /{}/ws HTTP/1.1\r\nHost: gw\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\r\n",
        id
    );
    stream.write_all(req.as_bytes()).await.unwrap();

    let mut resp = [0u8; 56];
    stream.read_exact(&mut resp).await.unwrap();
    assert!(resp.starts_with(b"HTTP/1.1 101"));

    stream.write_all(b"frame-1").await.unwrap();
    let mut echo = [0u8; 7];
    stream.read_exact(&mut echo).await.unwrap();
    assert_eq!(&echo, b"frame-1");
    drop(stream);

    // the spliced endpoint left the pool; the agent dials a replacement
    assert!(wait_for_sockets(running.public_addr, &id, 2).await);

    running.shutdown().await;
}

#[tokio::test]
async fn test_dead_local_service_yields_502() {
    let running = start_gateway().await;

    // grab a port, then kill the listener: the local service is gone
    let local_port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let id = start_agent(&running, local_port, 1).await;
    assert!(wait_for_sockets(running.public_addr, &id, 1).await);

    // the agent answers with a synthetic 502 and the endpoint stays usable
    let (status, body) = http_get(running.public_addr, &format!("/{}/x", id)).await;
    assert_eq!(status, 502);
    assert_eq!(body, "Bad Gateway");
    assert!(wait_for_sockets(running.public_addr, &id, 1).await);

    running.shutdown().await;
}
