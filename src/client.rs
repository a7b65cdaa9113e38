//! トラッカー群を入り口とするクライアント。
use fdfs_pool::PoolConfig;
use slog::{Discard, Logger};
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::connection::ConnectionOptions;
use crate::group::TrackerGroup;
use crate::metrics::Metrics;
use crate::registry::PoolRegistry;
use crate::storage::StorageServer;
use crate::tracker::TrackerServer;
use crate::{ErrorKind, Result, ServerAddr};

/// `TrackerClient`のビルダ。
#[derive(Debug, Clone)]
pub struct TrackerClientBuilder {
    logger: Logger,
    metrics: Option<Metrics>,

    /// サーバ毎のコネクションプールの設定。
    pub pool: PoolConfig,

    /// コネクションのソケットオプション。
    pub connection: ConnectionOptions,
}
impl TrackerClientBuilder {
    /// 新しい`TrackerClientBuilder`インスタンスを生成する。
    pub fn new() -> Self {
        TrackerClientBuilder {
            logger: Logger::root(Discard, o!()),
            metrics: None,
            pool: PoolConfig::default(),
            connection: ConnectionOptions::default(),
        }
    }

    /// 設定ファイルの内容からビルダを生成する。
    pub fn from_config(config: &ClientConfig) -> Self {
        TrackerClientBuilder {
            logger: Logger::root(Discard, o!()),
            metrics: None,
            pool: config.pool.clone(),
            connection: config.connection.clone(),
        }
    }

    /// ロガーを設定する。
    ///
    /// デフォルトでは全てのログが捨てられる。
    pub fn logger(&mut self, logger: Logger) -> &mut Self {
        self.logger = logger;
        self
    }

    /// メトリクスの収集を有効にする。
    pub fn metrics(&mut self, metrics: Metrics) -> &mut Self {
        self.metrics = Some(metrics);
        self
    }

    /// 指定されたトラッカー群に対するクライアントを生成する。
    ///
    /// この時点では各トラッカーへの接続は行わない(`PoolConfig::min_idle`が正の場合を除く)。
    pub fn finish(&self, trackers: &[ServerAddr]) -> Result<TrackerClient> {
        track_assert!(
            !trackers.is_empty(),
            ErrorKind::InvalidInput,
            "no tracker address is given"
        );
        let registry = Arc::new(PoolRegistry::new(
            self.logger.clone(),
            self.pool.clone(),
            self.connection.clone(),
            self.metrics.clone(),
        ));
        let trackers = trackers
            .iter()
            .map(|addr| TrackerServer::new(&self.logger, addr.clone(), Arc::clone(&registry)))
            .collect::<Result<Vec<_>>>();
        let trackers = track!(trackers)?;
        info!(self.logger, "Tracker client created"; "trackers" => trackers.len());

        Ok(TrackerClient {
            logger: self.logger.clone(),
            registry,
            group: TrackerGroup::new(self.logger.clone(), trackers),
        })
    }
}
impl Default for TrackerClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// クライアント。
///
/// 全てのサーバハンドルのコネクションプールを所有し、[`close`](TrackerClient::close)でまとめて解放する。
#[derive(Debug)]
pub struct TrackerClient {
    logger: Logger,
    registry: Arc<PoolRegistry>,
    group: TrackerGroup,
}
impl TrackerClient {
    /// デフォルト設定でクライアントを生成する。
    pub fn new(trackers: &[ServerAddr]) -> Result<Self> {
        track!(TrackerClientBuilder::new().finish(trackers))
    }

    /// 利用可能なトラッカーを一つ選ぶ。
    pub fn tracker(&self) -> Result<TrackerServer> {
        track!(self.group.select_tracker())
    }

    /// 利用可能なトラッカーに、ファイルの保存先となるストレージサーバを問い合わせる。
    pub fn get_store_storage(&self, group_name: Option<&str>) -> Result<StorageServer> {
        let tracker = track!(self.tracker())?;
        track!(tracker.get_store_storage(group_name), "tracker={}", tracker.addr())
    }

    /// 設定されているトラッカー群を返す。
    pub fn trackers(&self) -> &[TrackerServer] {
        self.group.trackers()
    }

    /// 保持している全てのコネクションプールの数を返す。
    pub fn pool_count(&self) -> usize {
        self.registry.len()
    }

    /// 全てのトラッカー(および、それらから得た全てのストレージサーバ)を閉じる。
    pub fn close(&self) -> Result<()> {
        info!(self.logger, "Close tracker client");
        let result = track!(self.group.close());
        track!(self.registry.close_all())?;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{self, MockServer, Reply};
    use fdfs_protocol::{command, Metadata};
    use std::io::Cursor;
    use trackable::result::TestResult;

    fn upload_reply() -> Vec<u8> {
        let mut body = b"group1".to_vec();
        body.resize(16, 0);
        body.extend_from_slice(b"M00/00/00/rBEADF5cx-mAKJilAAu_iN43pko886.jpg");
        body
    }

    #[test]
    fn empty_trackers_are_rejected() {
        let e = TrackerClient::new(&[]).err().map(|e| e.kind().clone());
        assert_eq!(e, Some(ErrorKind::InvalidInput));
    }

    #[test]
    fn upload_through_tracker_works() -> TestResult {
        let storage = track!(MockServer::start(|request| match request.command {
            command::UPLOAD_FILE => Reply::ok(upload_reply()),
            _ => Reply::ok(Vec::new()),
        }))?;
        let storage_port = storage.addr().port();
        let tracker = track!(MockServer::start(move |request| match request.command {
            command::QUERY_STORE_WITHOUT_GROUP => Reply::ok(test_util::store_storage_body(
                "group1",
                "127.0.0.1",
                storage_port,
                0
            )),
            _ => Reply::ok(Vec::new()),
        }))?;
        let unreachable = track!(test_util::unused_addr())?;

        let client = track!(TrackerClient::new(&[unreachable, tracker.addr().clone()]))?;
        let server = track!(client.get_store_storage(None))?;
        assert_eq!(server.addr(), storage.addr());

        let file = track!(server.upload(
            Cursor::new(vec![0; 1024]),
            1024,
            "jpg",
            &Metadata::new()
        ))?;
        assert_eq!(file.group_name, "group1");
        assert_eq!(
            file.filename,
            "M00/00/00/rBEADF5cx-mAKJilAAu_iN43pko886.jpg"
        );

        assert_eq!(client.pool_count(), 3);
        track!(client.close())?;
        assert_eq!(client.pool_count(), 0);
        assert!(!server.check_status());
        Ok(())
    }

    #[test]
    fn metrics_count_transactions() -> TestResult {
        let storage = track!(MockServer::start(|request| match request.command {
            command::UPLOAD_FILE => Reply::ok(upload_reply()),
            command::GET_METADATA => Reply::status(2),
            _ => Reply::ok(Vec::new()),
        }))?;
        let storage_port = storage.addr().port();
        let tracker = track!(MockServer::start(move |request| match request.command {
            command::QUERY_STORE_WITH_GROUP => Reply::ok(test_util::store_storage_body(
                "group1",
                "127.0.0.1",
                storage_port,
                0
            )),
            _ => Reply::ok(Vec::new()),
        }))?;

        let metrics = track!(Metrics::new())?;
        let mut builder = TrackerClientBuilder::new();
        builder.metrics(metrics.clone());
        let client = track!(builder.finish(&[tracker.addr().clone()]))?;

        let server = track!(client.get_store_storage(Some("group1")))?;
        track!(server.upload(Cursor::new(vec![0; 16]), 16, "txt", &Metadata::new()))?;
        assert!(server.get_metadata("group1", "M00/00/00/a.txt").is_err());

        assert_eq!(metrics.requests(command::QUERY_STORE_WITH_GROUP), 1);
        assert_eq!(metrics.requests(command::UPLOAD_FILE), 1);
        assert_eq!(metrics.failed_requests(command::UPLOAD_FILE), 0);
        assert_eq!(metrics.requests(command::GET_METADATA), 1);
        assert_eq!(metrics.failed_requests(command::GET_METADATA), 1);
        assert_eq!(metrics.failed_active_tests(), 0);
        assert_eq!(metrics.opened_connections(), 2);

        track!(client.close())?;
        assert_eq!(metrics.closed_connections(), 2);
        Ok(())
    }
}
