use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use trackable::error::ErrorKindExt;

use crate::{Error, ErrorKind, Result};

/// トラッカーもしくはストレージサーバのアドレス。
///
/// コネクションプールやサーバハンドルの同一性は、このアドレスによって判定される。
///
/// # Examples
///
/// ```
/// use fdfs_client::ServerAddr;
///
/// let addr: ServerAddr = "tracker1.example:22122".parse().unwrap();
/// assert_eq!(addr.host(), "tracker1.example");
/// assert_eq!(addr.port(), 22122);
/// assert_eq!(addr.to_string(), "tracker1.example:22122");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerAddr {
    host: String,
    port: u16,
}
impl ServerAddr {
    /// 新しい`ServerAddr`インスタンスを生成する。
    pub fn new<H: Into<String>>(host: H, port: u16) -> Self {
        ServerAddr {
            host: host.into(),
            port,
        }
    }

    /// ホスト名(もしくはIPアドレス)を返す。
    pub fn host(&self) -> &str {
        &self.host
    }

    /// ポート番号を返す。
    pub fn port(&self) -> u16 {
        self.port
    }

    /// 名前解決を行い、接続候補となるソケットアドレス群を返す。
    pub fn resolve(&self) -> Result<Vec<SocketAddr>> {
        let addrs = track!((self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| ErrorKind::ConnectError.cause(e)))?;
        let addrs = addrs.collect::<Vec<_>>();
        track_assert!(
            !addrs.is_empty(),
            ErrorKind::ConnectError,
            "no address resolved: {}",
            self
        );
        Ok(addrs)
    }
}
impl From<SocketAddr> for ServerAddr {
    fn from(f: SocketAddr) -> Self {
        ServerAddr::new(f.ip().to_string(), f.port())
    }
}
impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
impl FromStr for ServerAddr {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        let i = track_assert_some!(s.rfind(':'), ErrorKind::InvalidInput, "{:?}", s);
        let host = s[..i].trim_start_matches('[').trim_end_matches(']');
        track_assert!(!host.is_empty(), ErrorKind::InvalidInput, "{:?}", s);
        let port = track!(s[i + 1..].parse::<u16>().map_err(Error::from), "{:?}", s)?;
        Ok(ServerAddr::new(host, port))
    }
}
impl Serialize for ServerAddr {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_string().serialize(serializer)
    }
}
impl<'de> Deserialize<'de> for ServerAddr {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
