//! トラッカーサーバ。
use fdfs_protocol::command;
use fdfs_protocol::field::{self, GROUP_NAME_LEN};
use slog::Logger;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io;
use std::sync::{Arc, Mutex};
use trackable::error::ErrorKindExt;

use crate::registry::PoolRegistry;
use crate::server::ServerCore;
use crate::storage::StorageServer;
use crate::{Error, ErrorKind, Result, ServerAddr};

const STORE_STORAGE_BODY_LEN: usize = 40;
const HOST_RANGE: (usize, usize) = (16, 32);
const PORT_OFFSET: usize = 31;
const STORE_PATH_OFFSET: usize = 39;

/// トラッカーサーバのハンドル。
///
/// 同じアドレスを指すハンドル同士は等しいとみなされ、コネクションプールも共有される。
#[derive(Clone)]
pub struct TrackerServer {
    logger: Logger,
    core: ServerCore,
    storages: Arc<Mutex<HashSet<StorageServer>>>,
}
impl TrackerServer {
    /// 新しい`TrackerServer`インスタンスを生成する。
    pub fn new(logger: &Logger, addr: ServerAddr, registry: Arc<PoolRegistry>) -> Result<Self> {
        let core = track!(ServerCore::new(logger, addr, registry))?;
        Ok(TrackerServer {
            logger: logger.clone(),
            core,
            storages: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// トラッカーのアドレスを返す。
    pub fn addr(&self) -> &ServerAddr {
        self.core.addr()
    }

    /// 有効なコネクションが得られるかどうかを判定する。
    pub fn check_status(&self) -> bool {
        self.core.check_status()
    }

    /// ファイルの保存先となるストレージサーバを問い合わせる。
    ///
    /// `group_name`が`None`もしくは空白のみの場合は、グループを指定せずに問い合わせる。
    ///
    /// 返されたストレージサーバは、このトラッカーの[`close`](TrackerServer::close)時に一緒に閉じられる。
    pub fn get_store_storage(&self, group_name: Option<&str>) -> Result<StorageServer> {
        let group_name = group_name.map(str::trim).filter(|g| !g.is_empty());
        let response = if let Some(group_name) = group_name {
            let mut body = Vec::with_capacity(GROUP_NAME_LEN);
            field::put_fixed_str(&mut body, group_name, GROUP_NAME_LEN);
            track!(self.core.transact(
                command::QUERY_STORE_WITH_GROUP,
                Some(&body[..]),
                GROUP_NAME_LEN as u64,
                None::<io::Empty>
            ))?
        } else {
            track!(self.core.transact(
                command::QUERY_STORE_WITHOUT_GROUP,
                None,
                0,
                None::<io::Empty>
            ))?
        };

        let (addr, store_path) = track!(parse_store_storage(&response), "tracker={}", self.addr())?;
        debug!(self.core.logger(), "Store storage selected";
               "storage" => addr.to_string(), "store_path" => store_path);

        let storage = track!(StorageServer::new(
            &self.logger,
            addr,
            store_path,
            self.core.registry()
        ))?;
        track!(self.storages())?.insert(storage.clone());
        Ok(storage)
    }

    /// このトラッカーのコネクションプールを閉じ、
    /// これまでに返した全てのストレージサーバも閉じる。
    ///
    /// 途中で失敗しても全てを閉じ、最初のエラーを返す。
    pub fn close(&self) -> Result<()> {
        let mut result = track!(self.core.close());
        let storages = track!(self.storages())?.drain().collect::<Vec<_>>();
        for storage in storages {
            if let Err(e) = storage.close() {
                if result.is_ok() {
                    result = Err(track!(e, "storage={}", storage.addr()));
                }
            }
        }
        result
    }

    fn storages(&self) -> Result<std::sync::MutexGuard<HashSet<StorageServer>>> {
        self.storages
            .lock()
            .map_err(|_| ErrorKind::Other.cause("storage set is poisoned").into())
    }
}
impl PartialEq for TrackerServer {
    fn eq(&self, other: &Self) -> bool {
        self.core == other.core
    }
}
impl Eq for TrackerServer {}
impl Hash for TrackerServer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core.hash(state);
    }
}
impl fmt::Debug for TrackerServer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TrackerServer {{ addr: {} }}", self.addr())
    }
}

/// `QUERY_STORE_*`のレスポンスボディから、ストレージのアドレスとストアパスを取り出す。
///
/// ボディの形式は`group(16) + host(15) + port(8) + store_path(1)`だが、
/// ホスト名は`16..32`の範囲から読み込む(ポートの先頭1バイトを含み得るので末尾の`NUL`は取り除く)。
fn parse_store_storage(body: &[u8]) -> Result<(ServerAddr, u8)> {
    track_assert!(
        body.len() >= STORE_STORAGE_BODY_LEN,
        ErrorKind::MalformedFrame,
        "too short store storage response: {} bytes",
        body.len()
    );
    let host = track!(field::read_fixed_str(&body[HOST_RANGE.0..HOST_RANGE.1]).map_err(Error::from))?;
    track_assert!(!host.is_empty(), ErrorKind::MalformedFrame, "empty storage host");

    let port = track!(field::read_u64_at(body, PORT_OFFSET).map_err(Error::from))?;
    track_assert!(
        port <= u64::from(u16::MAX),
        ErrorKind::MalformedFrame,
        "storage port out of range: {}",
        port
    );
    Ok((ServerAddr::new(host, port as u16), body[STORE_PATH_OFFSET]))
}
