//! サーバとの間の単一のTCPコネクション。
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;
use trackable::error::ErrorKindExt;

use crate::{Error, ErrorKind, Result, ServerAddr};

/// コネクションのソケットオプション。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// 受信バッファのサイズ(バイト)。
    #[serde(default = "default_buffer_size")]
    pub recv_buffer_size: usize,

    /// 送信バッファのサイズ(バイト)。
    #[serde(default = "default_buffer_size")]
    pub send_buffer_size: usize,

    /// `SO_KEEPALIVE`を有効にするかどうか。
    #[serde(default = "default_true")]
    pub keepalive: bool,

    /// `SO_REUSEADDR`を有効にするかどうか。
    #[serde(default = "default_true")]
    pub reuse_address: bool,

    /// `SO_LINGER`の時間。
    #[serde(
        rename = "linger_millis",
        default = "default_linger",
        with = "fdfs_core::serde_ext::duration_millis"
    )]
    pub linger: Duration,

    /// 接続時のタイムアウト。`None`の場合はOSの既定値に従う。
    #[serde(
        rename = "connect_timeout_millis",
        default,
        with = "fdfs_core::serde_ext::option_duration_millis"
    )]
    pub connect_timeout: Option<Duration>,

    /// ストリームの転送およびレスポンスの受信を行う際のチャンクサイズ(バイト)。
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}
impl Default for ConnectionOptions {
    fn default() -> Self {
        ConnectionOptions {
            recv_buffer_size: default_buffer_size(),
            send_buffer_size: default_buffer_size(),
            keepalive: true,
            reuse_address: true,
            linger: default_linger(),
            connect_timeout: None,
            chunk_size: default_chunk_size(),
        }
    }
}

fn default_buffer_size() -> usize {
    128 * 1024
}

fn default_true() -> bool {
    true
}

fn default_linger() -> Duration {
    Duration::from_secs(5)
}

fn default_chunk_size() -> usize {
    4 * 1024
}

/// ブロッキングI/Oを行うTCPコネクション。
///
/// 一つのコネクションを複数のスレッドから同時に使うことは想定していない
/// (プールから借りたスレッドが排他的に所有する)。
pub struct Connection {
    addr: ServerAddr,
    stream: TcpStream,
    chunk_size: usize,
    connected: bool,
}
impl Connection {
    /// `addr`に接続する。
    ///
    /// 名前解決の結果のうち、最初に接続に成功したアドレスが使われる。
    pub fn open(addr: &ServerAddr, options: &ConnectionOptions) -> Result<Self> {
        let mut last_error = None;
        for socket_addr in track!(addr.resolve())? {
            match connect(socket_addr, options) {
                Ok(stream) => {
                    return Ok(Connection {
                        addr: addr.clone(),
                        stream,
                        chunk_size: options.chunk_size.max(1),
                        connected: true,
                    });
                }
                Err(e) => last_error = Some(e),
            }
        }
        let e = match last_error {
            Some(e) => ErrorKind::ConnectError.cause(e),
            None => ErrorKind::ConnectError.error(),
        };
        Err(track!(Error::from(e), "server={}", addr))
    }

    /// 接続先のアドレスを返す。
    pub fn addr(&self) -> &ServerAddr {
        &self.addr
    }

    /// フレームを送信する。
    pub fn send(&mut self, frame: &[u8]) -> Result<()> {
        track_assert!(
            self.connected,
            ErrorKind::WriteError,
            "not connected: server={}",
            self.addr
        );
        track!(self.write_all(frame))
    }

    /// フレームを送信し、レスポンスを受信する。
    ///
    /// `source`が指定された場合は、フレームに続けてその先頭`source_len`バイトをチャンク単位でソケットに流し込む。
    /// `source`が`source_len`バイトに満たない場合は`WriteError`となり、以降このコネクションは使えない。
    /// `source`は成否に関わらず、このメソッドから戻る時点で閉じられる(dropされる)。
    ///
    /// 受信したチャンクは順に`on_chunk`に渡される。
    /// `on_chunk`が`false`を返すか、相手がストリームを閉じた時点で受信を終える。
    pub fn send_and_receive<R, F>(
        &mut self,
        frame: &[u8],
        source: Option<R>,
        source_len: u64,
        mut on_chunk: F,
    ) -> Result<()>
    where
        R: Read,
        F: FnMut(&[u8]) -> bool,
    {
        track!(self.send(frame))?;
        if let Some(source) = source {
            track!(self.copy_from(source, source_len))?;
        }

        let mut buf = vec![0; self.chunk_size];
        loop {
            let size = match self.stream.read(&mut buf) {
                Ok(0) => {
                    self.connected = false;
                    break;
                }
                Ok(size) => size,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.connected = false;
                    track_panic!(
                        ErrorKind::ReadError,
                        "cannot read from {}: {}",
                        self.addr,
                        e
                    );
                }
            };
            if !on_chunk(&buf[..size]) {
                break;
            }
        }
        Ok(())
    }

    /// コネクションが利用可能な状態かどうかを判定する。
    pub fn is_connected(&self) -> bool {
        self.connected && self.stream.peer_addr().is_ok()
    }

    /// ソケットを閉じる。
    pub fn close(self) -> Result<()> {
        track!(self
            .stream
            .shutdown(Shutdown::Both)
            .map_err(|e| ErrorKind::Other.cause(e)), "server={}", self.addr)?;
        Ok(())
    }

    fn copy_from<R: Read>(&mut self, source: R, len: u64) -> Result<()> {
        let mut source = source.take(len);
        let mut buf = vec![0; self.chunk_size];
        let mut copied = 0;
        loop {
            let size = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(size) => size,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // 宣言したボディ長を送り切れないので、以降このコネクションは使えない
                    self.connected = false;
                    track_panic!(
                        ErrorKind::WriteError,
                        "cannot read the source stream for {}: {}",
                        self.addr,
                        e
                    );
                }
            };
            track!(self.write_all(&buf[..size]))?;
            copied += size as u64;
        }
        if copied != len {
            // 宣言したボディ長を送り切れないので、以降このコネクションは使えない
            self.connected = false;
            track_panic!(
                ErrorKind::WriteError,
                "source stream for {} ended early: expected={}, copied={}",
                self.addr,
                len,
                copied
            );
        }
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        if let Err(e) = self.stream.write_all(bytes).and_then(|()| self.stream.flush()) {
            self.connected = false;
            track_panic!(ErrorKind::WriteError, "cannot write to {}: {}", self.addr, e);
        }
        Ok(())
    }
}
impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Connection {{ addr: {}, local_addr: {:?}, connected: {} }}",
            self.addr,
            self.stream.local_addr().ok(),
            self.connected
        )
    }
}

fn connect(addr: SocketAddr, options: &ConnectionOptions) -> io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_recv_buffer_size(options.recv_buffer_size)?;
    socket.set_send_buffer_size(options.send_buffer_size)?;
    socket.set_keepalive(options.keepalive)?;
    socket.set_reuse_address(options.reuse_address)?;
    socket.set_linger(Some(options.linger))?;

    let addr = SockAddr::from(addr);
    if let Some(timeout) = options.connect_timeout {
        socket.connect_timeout(&addr, timeout)?;
    } else {
        socket.connect(&addr)?;
    }
    Ok(TcpStream::from(socket))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::TcpListener;
    use std::thread;
    use trackable::result::TestResult;

    fn echo_server() -> Result<ServerAddr> {
        let listener = track!(TcpListener::bind("127.0.0.1:0").map_err(Error::from))?;
        let addr = ServerAddr::from(track!(listener.local_addr().map_err(Error::from))?);
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0; 1024];
                while let Ok(size) = stream.read(&mut buf) {
                    if size == 0 || stream.write_all(&buf[..size]).is_err() {
                        break;
                    }
                }
            }
        });
        Ok(addr)
    }

    #[test]
    fn default_options() {
        let options = ConnectionOptions::default();
        assert_eq!(options.recv_buffer_size, 131_072);
        assert_eq!(options.send_buffer_size, 131_072);
        assert!(options.keepalive);
        assert!(options.reuse_address);
        assert_eq!(options.linger, Duration::from_secs(5));
        assert_eq!(options.connect_timeout, None);
        assert_eq!(options.chunk_size, 4096);
    }

    #[test]
    fn options_from_yaml() -> TestResult {
        let options: ConnectionOptions = track!(serde_yaml::from_str(
            "connect_timeout_millis: 1500\nlinger_millis: 0\nkeepalive: false"
        )
        .map_err(Error::from))?;
        assert_eq!(options.connect_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(options.linger, Duration::from_millis(0));
        assert!(!options.keepalive);
        assert_eq!(options.chunk_size, 4096);
        Ok(())
    }

    #[test]
    fn send_and_receive_streams_source() -> TestResult {
        let addr = track!(echo_server())?;
        let mut connection = track!(Connection::open(&addr, &ConnectionOptions::default()))?;
        assert!(connection.is_connected());

        let payload = vec![7u8; 10_000];
        let mut received = Vec::new();
        track!(connection.send_and_receive(
            b"head",
            Some(Cursor::new(payload.clone())),
            payload.len() as u64,
            |chunk| {
                received.extend_from_slice(chunk);
                received.len() < 4 + payload.len()
            }
        ))?;
        assert_eq!(&received[..4], b"head");
        assert_eq!(&received[4..], &payload[..]);
        assert!(connection.is_connected());
        track!(connection.close())?;
        Ok(())
    }

    #[test]
    fn open_refused_port_fails() -> TestResult {
        let addr = {
            let listener = track!(TcpListener::bind("127.0.0.1:0").map_err(Error::from))?;
            ServerAddr::from(track!(listener.local_addr().map_err(Error::from))?)
        };
        let e = Connection::open(&addr, &ConnectionOptions::default())
            .err()
            .map(|e| e.kind().clone());
        assert_eq!(e, Some(ErrorKind::ConnectError));
        Ok(())
    }

    #[test]
    fn peer_close_marks_disconnected() -> TestResult {
        let listener = track!(TcpListener::bind("127.0.0.1:0").map_err(Error::from))?;
        let addr = ServerAddr::from(track!(listener.local_addr().map_err(Error::from))?);
        let handle = thread::spawn(move || {
            let _ = listener.accept();
        });
        let mut connection = track!(Connection::open(&addr, &ConnectionOptions::default()))?;
        let _ = handle.join();

        let mut chunks = 0;
        let _ = connection.send_and_receive(b"ping", None::<Cursor<Vec<u8>>>, 0, |_| {
            chunks += 1;
            true
        });
        assert_eq!(chunks, 0);
        assert!(!connection.is_connected());

        let e = connection.send(b"ping").err().map(|e| e.kind().clone());
        assert_eq!(e, Some(ErrorKind::WriteError));
        Ok(())
    }

    #[test]
    fn source_is_cut_at_declared_length() -> TestResult {
        let addr = track!(echo_server())?;
        let mut connection = track!(Connection::open(&addr, &ConnectionOptions::default()))?;

        let mut received = Vec::new();
        track!(connection.send_and_receive(
            b"head",
            Some(Cursor::new(vec![1u8; 20])),
            10,
            |chunk| {
                received.extend_from_slice(chunk);
                received.len() < 14
            }
        ))?;
        assert_eq!(received.len(), 14);
        assert_eq!(&received[4..], &[1u8; 10][..]);
        assert!(connection.is_connected());
        Ok(())
    }

    #[test]
    fn short_source_breaks_connection() -> TestResult {
        let addr = track!(echo_server())?;
        let mut connection = track!(Connection::open(&addr, &ConnectionOptions::default()))?;

        let mut chunks = 0;
        let e = connection
            .send_and_receive(b"head", Some(Cursor::new(vec![1u8; 5])), 10, |_| {
                chunks += 1;
                true
            })
            .err()
            .map(|e| e.kind().clone());
        assert_eq!(e, Some(ErrorKind::WriteError));
        assert_eq!(chunks, 0);
        assert!(!connection.is_connected());
        Ok(())
    }
}
