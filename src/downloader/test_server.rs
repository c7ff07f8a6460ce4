//! 测试用 HTTP/1.1 服务器
//!
//! 按脚本写出响应头和响应体，`gated` 时每发送一块之后都要等测试调用 `release` 才继续

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

/// 响应脚本
#[derive(Debug, Clone)]
pub(crate) struct Script {
    pub status: &'static str,
    pub content_length: Option<u64>,
    pub chunks: Vec<Vec<u8>>,
    pub gated: bool,
}

impl Script {
    /// 200 响应，按块发送，带 Content-Length
    pub fn ok(chunks: Vec<Vec<u8>>) -> Self {
        let total = chunks.iter().map(|c| c.len() as u64).sum();
        Self {
            status: "200 OK",
            content_length: Some(total),
            chunks,
            gated: false,
        }
    }

    pub fn status(status: &'static str) -> Self {
        Self {
            status,
            content_length: Some(0),
            chunks: Vec::new(),
            gated: false,
        }
    }

    pub fn gated(mut self) -> Self {
        self.gated = true;
        self
    }

    pub fn without_length(mut self) -> Self {
        self.content_length = None;
        self
    }
}

#[derive(Debug)]
struct Shared {
    script: Script,
    gate: Semaphore,
    requests: AtomicUsize,
    user_agent: Mutex<Option<String>>,
}

#[derive(Debug)]
pub(crate) struct TestServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
}

impl TestServer {
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(Shared {
            script,
            gate: Semaphore::new(0),
            requests: AtomicUsize::new(0),
            user_agent: Mutex::new(None),
        });

        let accept_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let shared = Arc::clone(&accept_shared);
                tokio::spawn(async move {
                    let _ = serve(stream, shared).await;
                });
            }
        });

        Self { addr, shared }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}/{}", self.addr, path.trim_start_matches('/'))
    }

    /// 放行下一块数据
    pub fn release(&self) {
        self.shared.gate.add_permits(1);
    }

    pub fn requests(&self) -> usize {
        self.shared.requests.load(Ordering::SeqCst)
    }

    pub fn user_agent(&self) -> Option<String> {
        self.shared.user_agent.lock().clone()
    }
}

async fn serve(mut stream: TcpStream, shared: Arc<Shared>) -> std::io::Result<()> {
    let head = read_request_head(&mut stream).await?;
    shared.requests.fetch_add(1, Ordering::SeqCst);

    let user_agent = head.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.eq_ignore_ascii_case("user-agent")
            .then(|| value.trim().to_string())
    });
    *shared.user_agent.lock() = user_agent;

    let script = &shared.script;
    let mut response = format!("HTTP/1.1 {}\r\n", script.status);
    if let Some(len) = script.content_length {
        response.push_str(&format!("Content-Length: {}\r\n", len));
    }
    response.push_str("Connection: close\r\n\r\n");
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;

    for (i, chunk) in script.chunks.iter().enumerate() {
        if script.gated && i > 0 {
            match shared.gate.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => return Ok(()),
            }
        }
        stream.write_all(chunk).await?;
        stream.flush().await?;
    }

    stream.shutdown().await
}

async fn read_request_head(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}
