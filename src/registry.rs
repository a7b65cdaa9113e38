//! サーバアドレス毎のコネクションプールの管理。
use fdfs_pool::{ObjectFactory, Pool, PoolConfig};
use slog::Logger;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use trackable::error::ErrorKindExt;

use crate::connection::{Connection, ConnectionOptions};
use crate::metrics::Metrics;
use crate::{Error, ErrorKind, Result, ServerAddr};

/// 一つのサーバアドレスに対するコネクションプール。
pub type ConnectionPool = Pool<ConnectionFactory>;

/// 固定のアドレスに対してコネクションを生成するファクトリ。
#[derive(Debug)]
pub struct ConnectionFactory {
    logger: Logger,
    addr: ServerAddr,
    options: ConnectionOptions,
    metrics: Option<Metrics>,
}
impl ConnectionFactory {
    /// 新しい`ConnectionFactory`インスタンスを生成する。
    pub fn new(
        logger: Logger,
        addr: ServerAddr,
        options: ConnectionOptions,
        metrics: Option<Metrics>,
    ) -> Self {
        ConnectionFactory {
            logger,
            addr,
            options,
            metrics,
        }
    }
}
impl ObjectFactory for ConnectionFactory {
    type Object = Connection;
    type Error = Error;

    fn make(&self) -> Result<Connection> {
        let connection = track!(Connection::open(&self.addr, &self.options))?;
        debug!(self.logger, "Connection opened: {:?}", connection);
        if let Some(ref metrics) = self.metrics {
            metrics.connection_opened();
        }
        Ok(connection)
    }

    fn validate(&self, connection: &Connection) -> bool {
        connection.is_connected()
    }

    fn destroy(&self, connection: Connection) -> Result<()> {
        debug!(self.logger, "Connection closed: {:?}", connection);
        if let Some(ref metrics) = self.metrics {
            metrics.connection_closed();
        }
        track!(connection.close())
    }
}

/// アドレス毎に一つのコネクションプールを保持するレジストリ。
///
/// プールは、そのアドレスのサーバハンドルが初めて作られた時に生成され、
/// サーバハンドルの`close`が呼ばれた時に閉じられて取り除かれる。
/// クライアントが所有し、`Arc`経由で全てのサーバハンドルから共有される。
#[derive(Debug)]
pub struct PoolRegistry {
    logger: Logger,
    pool_config: PoolConfig,
    options: ConnectionOptions,
    metrics: Option<Metrics>,
    pools: Mutex<HashMap<ServerAddr, Arc<ConnectionPool>>>,
}
impl PoolRegistry {
    /// 新しい`PoolRegistry`インスタンスを生成する。
    ///
    /// `metrics`が指定された場合は、このレジストリ配下の全てのプールとサーバハンドルで共有される。
    pub fn new(
        logger: Logger,
        pool_config: PoolConfig,
        options: ConnectionOptions,
        metrics: Option<Metrics>,
    ) -> Self {
        PoolRegistry {
            logger,
            pool_config,
            options,
            metrics,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// メトリクスを返す。
    pub fn metrics(&self) -> Option<&Metrics> {
        self.metrics.as_ref()
    }

    /// `addr`のプールを返す。存在しない場合は生成して登録する。
    ///
    /// 生成時には`min_idle`個のコネクションを事前に作成する。
    /// この事前作成に失敗してもプール自体は登録されたままとなる。
    pub fn get_or_create(&self, addr: &ServerAddr) -> Result<Arc<ConnectionPool>> {
        let pool = {
            let mut pools = track!(self.lock())?;
            if let Some(pool) = pools.get(addr) {
                return Ok(Arc::clone(pool));
            }

            let logger = self.logger.new(o!("server" => addr.to_string()));
            let factory = ConnectionFactory::new(
                logger,
                addr.clone(),
                self.options.clone(),
                self.metrics.clone(),
            );
            let pool = Arc::new(Pool::new(factory, self.pool_config.clone()));
            pools.insert(addr.clone(), Arc::clone(&pool));
            pool
        };
        debug!(self.logger, "Connection pool created"; "server" => addr.to_string());

        let min_idle = self.pool_config.min_idle;
        if min_idle > 0 {
            match pool.prewarm(min_idle) {
                Ok(added) => {
                    debug!(self.logger, "Connection pool prewarmed";
                           "server" => addr.to_string(), "connections" => added);
                }
                Err(e) => {
                    warn!(self.logger, "Cannot prewarm connection pool";
                          "server" => addr.to_string(), "error" => e.to_string());
                }
            }
        }
        Ok(pool)
    }

    /// 登録済みの`addr`のプールを返す。
    pub fn get(&self, addr: &ServerAddr) -> Result<Arc<ConnectionPool>> {
        let pools = track!(self.lock())?;
        let pool = track_assert_some!(
            pools.get(addr),
            ErrorKind::PoolError,
            "no connection pool (already closed?): server={}",
            addr
        );
        Ok(Arc::clone(pool))
    }

    /// `addr`のプールを取り除き、閉じる。
    ///
    /// プールが登録されていない場合は何もしない。
    pub fn remove(&self, addr: &ServerAddr) -> Result<()> {
        let pool = track!(self.lock())?.remove(addr);
        if let Some(pool) = pool {
            debug!(self.logger, "Connection pool closed"; "server" => addr.to_string());
            track!(pool.close(), "server={}", addr)?;
        }
        Ok(())
    }

    /// 登録されている全てのプールを取り除き、閉じる。
    ///
    /// 途中で失敗しても全てのプールを閉じ、最初のエラーを返す。
    pub fn close_all(&self) -> Result<()> {
        let pools = track!(self.lock())?.drain().collect::<Vec<_>>();
        let mut result = Ok(());
        for (addr, pool) in pools {
            debug!(self.logger, "Connection pool closed"; "server" => addr.to_string());
            if let Err(e) = pool.close() {
                if result.is_ok() {
                    result = Err(track!(e, "server={}", addr));
                }
            }
        }
        result
    }

    /// 登録されているプールの数を返す。
    pub fn len(&self) -> usize {
        self.pools.lock().map(|pools| pools.len()).unwrap_or(0)
    }

    /// 登録されているプールが無いかどうかを判定する。
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<HashMap<ServerAddr, Arc<ConnectionPool>>>> {
        self.pools
            .lock()
            .map_err(|_| ErrorKind::PoolError.cause("pool registry is poisoned").into())
    }
}
