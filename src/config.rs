//! クライアントの設定ファイル。
use fdfs_pool::PoolConfig;
use std::fs::File;
use std::path::Path;

use crate::connection::ConnectionOptions;
use crate::{Error, ErrorKind, Result, ServerAddr};

/// クライアントの設定。
///
/// YAML形式のファイルから読み込まれる:
///
/// ```yaml
/// trackers:
///   - "10.0.0.1:22122"
///   - "10.0.0.2:22122"
/// pool:
///   max_total: 16
///   max_wait_millis: 3000
/// connection:
///   connect_timeout_millis: 5000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// トラッカーのアドレス群。
    pub trackers: Vec<ServerAddr>,

    /// サーバ毎のコネクションプールの設定。
    #[serde(default)]
    pub pool: PoolConfig,

    /// コネクションのソケットオプション。
    #[serde(default)]
    pub connection: ConnectionOptions,
}
impl ClientConfig {
    /// 設定ファイルを読み込む。
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = track!(File::open(path).map_err(Error::from), "path={:?}", path)?;
        let config: Self = track!(serde_yaml::from_reader(file).map_err(Error::from), "path={:?}", path)?;
        track!(config.validate(), "path={:?}", path)?;
        Ok(config)
    }

    /// YAML形式の文字列から設定を読み込む。
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = track!(serde_yaml::from_str(yaml).map_err(Error::from))?;
        track!(config.validate())?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        track_assert!(
            !self.trackers.is_empty(),
            ErrorKind::InvalidInput,
            "no tracker address is configured"
        );
        Ok(())
    }
}
