//! トラッカーとストレージサーバに共通する、リクエスト/レスポンスの送受信処理。
use fdfs_protocol::command;
use fdfs_protocol::{encode_frame, ReceiveBuffer, Response, STATUS_SUCCESS};
use slog::Logger;
use std::hash::{Hash, Hasher};
use std::io::{self, Read};
use std::sync::Arc;

use crate::connection::Connection;
use crate::registry::{ConnectionPool, PoolRegistry};
use crate::{Error, ErrorKind, Result, ServerAddr};

/// 有効なコネクションを得るための試行回数の上限。
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// サーバハンドルが共有する送受信処理。
///
/// プールへの参照は保持せず、操作の度にレジストリから引き直す。
#[derive(Clone)]
pub struct ServerCore {
    logger: Logger,
    addr: ServerAddr,
    registry: Arc<PoolRegistry>,
}
impl ServerCore {
    /// 新しい`ServerCore`インスタンスを生成する。
    ///
    /// `addr`のプールがまだ無ければ、この時点で生成される。
    pub fn new(logger: &Logger, addr: ServerAddr, registry: Arc<PoolRegistry>) -> Result<Self> {
        track!(registry.get_or_create(&addr))?;
        let logger = logger.new(o!("server" => addr.to_string()));
        Ok(ServerCore {
            logger,
            addr,
            registry,
        })
    }

    pub fn addr(&self) -> &ServerAddr {
        &self.addr
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn registry(&self) -> Arc<PoolRegistry> {
        Arc::clone(&self.registry)
    }

    /// リクエストを送信し、成功レスポンスのボディを返す。
    ///
    /// `source`が無い場合、ボディは`reserved_body_len`までゼロで埋められる。
    /// `source`がある場合は`body`だけをフレームに載せ、残りの`reserved_body_len - body.len()`バイトを
    /// `source`から流し込む。
    ///
    /// 借りたコネクションは、成否に関わらずプールに戻される。
    pub fn transact<R: Read>(
        &self,
        command: u8,
        body: Option<&[u8]>,
        reserved_body_len: u64,
        source: Option<R>,
    ) -> Result<Vec<u8>> {
        let pool = track!(self.pool())?;
        let use_reserved_len = source.is_none();
        let body_len = body.map_or(0, |b| b.len() as u64);
        track_assert!(
            body_len <= reserved_body_len,
            ErrorKind::InvalidInput,
            "body is longer than reserved: body={}, reserved={}",
            body_len,
            reserved_body_len
        );
        let source_len = reserved_body_len - body_len;
        let frame = track!(encode_frame(
            STATUS_SUCCESS,
            command,
            body,
            reserved_body_len,
            use_reserved_len
        )
        .map_err(Error::from))?;

        let mut connection = track!(self.valid_connection(&pool))?;
        if let Some(metrics) = self.registry.metrics() {
            metrics.request_sent(command);
        }
        let response = match self.exchange(&mut connection, command, &frame, source, source_len) {
            Err(e) => {
                self.request_failed(command);
                if let Err(quit_error) = self.quit(&pool, connection) {
                    debug!(self.logger, "Cannot quit broken connection: {}", quit_error);
                }
                return Err(track!(e, "server={}, command={}", self.addr, command::name(command)));
            }
            Ok(response) => {
                track!(pool.release(connection))?;
                response
            }
        };

        if !response.is_success() {
            self.request_failed(command);
        }
        track_assert!(
            response.is_success(),
            ErrorKind::Protocol {
                status: response.status
            },
            "server={}, command={}, status={}",
            self.addr,
            command::name(command),
            response.status
        );
        Ok(response.into_body())
    }

    /// レスポンスを待たずに、ボディ無しのコマンドを送信する。
    pub fn send(&self, connection: &mut Connection, command: u8) -> Result<()> {
        let frame = track!(encode_frame(STATUS_SUCCESS, command, None, 0, true).map_err(Error::from))?;
        debug!(self.logger, "Send frame";
               "command" => command::name(command), "frame" => hex::encode(&frame));
        track!(connection.send(&frame), "command={}", command::name(command))
    }

    /// `QUIT`を送信した上で、コネクションを無効化する。
    ///
    /// 単に使い終わったのではなく、もう使えないことが分かっているコネクションに対して使う。
    pub fn quit(&self, pool: &ConnectionPool, mut connection: Connection) -> Result<()> {
        let result = self.send(&mut connection, command::QUIT);
        track!(pool.invalidate(connection))?;
        track!(result)
    }

    /// 有効なコネクションが得られるかどうかを判定する。
    ///
    /// 得られたコネクションはそのままプールに戻す。
    pub fn check_status(&self) -> bool {
        let result = self.pool().and_then(|pool| {
            let connection = track!(self.valid_connection(&pool))?;
            track!(pool.release(connection))
        });
        match result {
            Ok(()) => true,
            Err(e) => {
                debug!(self.logger, "Server is unavailable: {}", e);
                false
            }
        }
    }

    /// このアドレスのプールを閉じ、レジストリから取り除く。
    pub fn close(&self) -> Result<()> {
        debug!(self.logger, "Close server");
        track!(self.registry.remove(&self.addr))
    }

    /// 生存確認(`ACTIVE_TEST`)に成功したコネクションを借りる。
    ///
    /// - 送受信に失敗した場合は、コネクションを破棄せずに手放して再試行する
    /// - 失敗ステータスが返った場合は、コネクションを無効化して再試行する
    ///
    /// [`DEFAULT_MAX_RETRIES`]回の試行で得られなければ`ConnectionUnavailable`となる。
    /// プールからの貸し出し自体の失敗(接続失敗を含む)は、そのまま呼び出し元に返される。
    pub fn valid_connection(&self, pool: &ConnectionPool) -> Result<Connection> {
        let frame = track!(encode_frame(STATUS_SUCCESS, command::ACTIVE_TEST, None, 0, true)
            .map_err(Error::from))?;
        for attempt in 1..=DEFAULT_MAX_RETRIES {
            let mut connection = track!(pool.borrow())?;
            let result =
                self.exchange(&mut connection, command::ACTIVE_TEST, &frame, None::<io::Empty>, 0);
            match result {
                Ok(ref response) if response.is_success() => return Ok(connection),
                Ok(response) => {
                    self.active_test_failed();
                    warn!(self.logger, "Active test failed";
                          "attempt" => attempt, "status" => response.status);
                    if let Err(e) = pool.invalidate(connection) {
                        debug!(self.logger, "Cannot destroy connection: {}", e);
                    }
                }
                Err(e) => {
                    self.active_test_failed();
                    warn!(self.logger, "Active test failed";
                          "attempt" => attempt, "error" => e.to_string());
                    track!(pool.abandon(connection))?;
                }
            }
        }
        track_panic!(
            ErrorKind::ConnectionUnavailable,
            "no valid connection after {} attempts: server={}",
            DEFAULT_MAX_RETRIES,
            self.addr
        );
    }

    fn exchange<R: Read>(
        &self,
        connection: &mut Connection,
        command: u8,
        frame: &[u8],
        source: Option<R>,
        source_len: u64,
    ) -> Result<Response> {
        debug!(self.logger, "Send frame";
               "command" => command::name(command), "frame" => hex::encode(frame));
        let mut buffer = ReceiveBuffer::new();
        track!(connection.send_and_receive(frame, source, source_len, |chunk| buffer.push(chunk)))?;
        debug!(self.logger, "Received frame";
               "command" => command::name(command), "frame" => hex::encode(buffer.as_bytes()));
        let response = track!(buffer.decode().map_err(Error::from))?;
        Ok(response)
    }

    fn active_test_failed(&self) {
        if let Some(metrics) = self.registry.metrics() {
            metrics.active_test_failed();
        }
    }

    fn request_failed(&self, command: u8) {
        if let Some(metrics) = self.registry.metrics() {
            metrics.request_failed(command);
        }
    }

    fn pool(&self) -> Result<Arc<ConnectionPool>> {
        track!(self.registry.get(&self.addr))
    }
}
impl PartialEq for ServerCore {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}
impl Eq for ServerCore {}
impl Hash for ServerCore {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionOptions;
    use crate::test_util::{MockServer, Reply};
    use fdfs_pool::PoolConfig;
    use slog::Discard;
    use std::io::Cursor;
    use trackable::result::TestResult;

    fn registry() -> Arc<PoolRegistry> {
        Arc::new(PoolRegistry::new(
            Logger::root(Discard, o!()),
            PoolConfig::default(),
            ConnectionOptions::default(),
            None,
        ))
    }

    fn core(addr: &ServerAddr, registry: &Arc<PoolRegistry>) -> Result<ServerCore> {
        let logger = Logger::root(Discard, o!());
        ServerCore::new(&logger, addr.clone(), Arc::clone(registry))
    }

    #[test]
    fn bad_active_test_status_gives_up_after_three_attempts() -> TestResult {
        let server = track!(MockServer::start(|_| Reply::status(2)))?;
        let registry = registry();
        let core = track!(core(server.addr(), &registry))?;

        let pool = track!(registry.get(server.addr()))?;
        let e = core.valid_connection(&pool).err().map(|e| e.kind().clone());
        assert_eq!(e, Some(ErrorKind::ConnectionUnavailable));

        server.wait_accepted(3);
        assert_eq!(server.accepted(), 3);
        let commands = server
            .requests()
            .into_iter()
            .map(|r| r.command)
            .collect::<Vec<_>>();
        assert_eq!(commands, vec![command::ACTIVE_TEST; 3]);
        assert_eq!(pool.num_active(), 0);
        assert_eq!(pool.num_idle(), 0);
        Ok(())
    }

    #[test]
    fn broken_active_test_gives_up_after_three_attempts() -> TestResult {
        let server = track!(MockServer::start(|_| Reply::Close))?;
        let registry = registry();
        let core = track!(core(server.addr(), &registry))?;

        let pool = track!(registry.get(server.addr()))?;
        let e = core.valid_connection(&pool).err().map(|e| e.kind().clone());
        assert_eq!(e, Some(ErrorKind::ConnectionUnavailable));

        server.wait_accepted(3);
        assert_eq!(server.accepted(), 3);
        assert_eq!(server.requests().len(), 3);
        assert_eq!(pool.num_active(), 0);
        assert!(!core.check_status());
        Ok(())
    }

    #[test]
    fn transact_reuses_connection() -> TestResult {
        let server = track!(MockServer::start(|request| match request.command {
            command::GET_METADATA => Reply::ok(b"width\x02200".to_vec()),
            _ => Reply::ok(Vec::new()),
        }))?;
        let registry = registry();
        let core = track!(core(server.addr(), &registry))?;

        for _ in 0..3 {
            let body = track!(core.transact(
                command::GET_METADATA,
                Some(&b"group1"[..]),
                16,
                None::<Cursor<Vec<u8>>>
            ))?;
            assert_eq!(body, b"width\x02200");
        }
        assert_eq!(server.accepted(), 1);

        let requests = server.requests();
        assert_eq!(requests.len(), 6);
        assert_eq!(requests[1].command, command::GET_METADATA);
        assert_eq!(requests[1].declared_body_len, 16);
        assert_eq!(requests[1].body.len(), 16);

        let pool = track!(registry.get(server.addr()))?;
        assert_eq!(pool.num_active(), 0);
        assert_eq!(pool.num_idle(), 1);
        Ok(())
    }

    #[test]
    fn transact_reports_protocol_status() -> TestResult {
        let server = track!(MockServer::start(|request| match request.command {
            command::GET_METADATA => Reply::status(22),
            _ => Reply::ok(Vec::new()),
        }))?;
        let registry = registry();
        let core = track!(core(server.addr(), &registry))?;

        let e = core
            .transact(command::GET_METADATA, None, 0, None::<Cursor<Vec<u8>>>)
            .err()
            .map(|e| e.kind().clone());
        assert_eq!(e, Some(ErrorKind::Protocol { status: 22 }));

        let pool = track!(registry.get(server.addr()))?;
        assert_eq!(pool.num_active(), 0);
        assert_eq!(pool.num_idle(), 1);
        Ok(())
    }

    #[test]
    fn transact_quits_broken_connection() -> TestResult {
        let server = track!(MockServer::start(|request| match request.command {
            command::GET_METADATA => Reply::Close,
            _ => Reply::ok(Vec::new()),
        }))?;
        let registry = registry();
        let core = track!(core(server.addr(), &registry))?;

        let e = core
            .transact(command::GET_METADATA, None, 0, None::<Cursor<Vec<u8>>>)
            .err()
            .map(|e| e.kind().clone());
        assert_eq!(e, Some(ErrorKind::MalformedFrame));

        let pool = track!(registry.get(server.addr()))?;
        assert_eq!(pool.num_active(), 0);
        assert_eq!(pool.num_idle(), 0);
        Ok(())
    }

    #[test]
    fn closed_server_is_unavailable() -> TestResult {
        let server = track!(MockServer::start(|_| Reply::ok(Vec::new())))?;
        let registry = registry();
        let core0 = track!(core(server.addr(), &registry))?;
        let core1 = track!(core(server.addr(), &registry))?;
        assert!(core0 == core1);
        assert_eq!(registry.len(), 1);
        assert!(core1.check_status());

        track!(core0.close())?;
        assert!(!core1.check_status());
        let e = core1
            .transact(command::GET_METADATA, None, 0, None::<Cursor<Vec<u8>>>)
            .err()
            .map(|e| e.kind().clone());
        assert_eq!(e, Some(ErrorKind::PoolError));
        Ok(())
    }
}
