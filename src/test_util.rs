//! テスト用のモックサーバ。
use byteorder::{BigEndian, ByteOrder};
use fdfs_protocol::{encode_frame, HEADER_SIZE};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::{Error, Result, ServerAddr};

/// モックサーバが受信したリクエスト。
#[derive(Debug, Clone)]
pub struct Request {
    pub command: u8,
    pub declared_body_len: u64,
    pub body: Vec<u8>,
}

/// モックサーバの応答。
#[derive(Debug, Clone)]
pub enum Reply {
    Respond { status: u8, body: Vec<u8> },
    Close,
}
impl Reply {
    pub fn ok(body: Vec<u8>) -> Self {
        Reply::Respond { status: 0, body }
    }

    pub fn status(status: u8) -> Self {
        Reply::Respond {
            status,
            body: Vec::new(),
        }
    }
}

/// `127.0.0.1`上で動作し、受信したリクエストを記録するモックサーバ。
///
/// `ACTIVE_TEST`を含む全てのリクエストがハンドラに渡される。
pub struct MockServer {
    addr: ServerAddr,
    accepted: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Request>>>,
}
impl MockServer {
    pub fn start<H>(handler: H) -> Result<Self>
    where
        H: Fn(&Request) -> Reply + Send + Sync + 'static,
    {
        let listener = track!(TcpListener::bind("127.0.0.1:0").map_err(Error::from))?;
        let addr = ServerAddr::from(track!(listener.local_addr().map_err(Error::from))?);
        let accepted = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(handler);
        {
            let accepted = Arc::clone(&accepted);
            let requests = Arc::clone(&requests);
            thread::spawn(move || {
                for stream in listener.incoming() {
                    let stream = match stream {
                        Ok(stream) => stream,
                        Err(_) => break,
                    };
                    accepted.fetch_add(1, Ordering::SeqCst);
                    let requests = Arc::clone(&requests);
                    let handler = Arc::clone(&handler);
                    thread::spawn(move || serve(stream, &requests, &*handler));
                }
            });
        }
        Ok(MockServer {
            addr,
            accepted,
            requests,
        })
    }

    pub fn addr(&self) -> &ServerAddr {
        &self.addr
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// 受け付けたコネクション数が`count`に達するまで(最大で1秒)待つ。
    pub fn wait_accepted(&self, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(1);
        while self.accepted() < count && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

/// 何も待ち受けていないアドレスを返す。
pub fn unused_addr() -> Result<ServerAddr> {
    let listener = track!(TcpListener::bind("127.0.0.1:0").map_err(Error::from))?;
    let addr = track!(listener.local_addr().map_err(Error::from))?;
    Ok(ServerAddr::from(addr))
}

/// トラッカーの`QUERY_STORE_*`に対するレスポンスボディを組み立てる。
pub fn store_storage_body(group: &str, host: &str, port: u16, store_path: u8) -> Vec<u8> {
    let mut body = Vec::new();
    fdfs_protocol::field::put_fixed_str(&mut body, group, 16);
    fdfs_protocol::field::put_fixed_str(&mut body, host, 15);
    let mut buf = [0; 8];
    BigEndian::write_u64(&mut buf, u64::from(port));
    body.extend_from_slice(&buf);
    body.push(store_path);
    body
}

fn serve<H>(mut stream: TcpStream, requests: &Mutex<Vec<Request>>, handler: &H)
where
    H: Fn(&Request) -> Reply,
{
    loop {
        let mut header = [0; HEADER_SIZE];
        if stream.read_exact(&mut header).is_err() {
            return;
        }
        let declared_body_len = BigEndian::read_u64(&header[0..8]);
        let mut body = Vec::new();
        if (&mut stream)
            .take(declared_body_len)
            .read_to_end(&mut body)
            .is_err()
        {
            return;
        }
        let request = Request {
            command: header[8],
            declared_body_len,
            body,
        };
        let reply = handler(&request);
        if let Ok(mut requests) = requests.lock() {
            requests.push(request);
        }

        match reply {
            Reply::Close => return,
            Reply::Respond { status, body } => {
                let frame = match encode_frame(status, 100, Some(&body[..]), body.len() as u64, true)
                {
                    Ok(frame) => frame,
                    Err(_) => return,
                };
                if stream.write_all(&frame).is_err() {
                    return;
                }
            }
        }
    }
}
