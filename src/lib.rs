//! トラッカー/ストレージ構成の分散ファイルストレージ用クライアント。
//!
//! # 構成
//!
//! - [`TrackerClient`]: 設定されたトラッカー群の入り口
//! - [`TrackerServer`]: ファイルの保存先ストレージを問い合わせる
//! - [`StorageServer`]: ファイルのアップロードとメタデータの操作を行う
//!
//! 各サーバとのコネクションは、アドレス毎のコネクションプールで管理される。
//! プールはクライアントが所有する[`PoolRegistry`]に登録され、
//! [`TrackerClient::close`]によってまとめて閉じられる。
//!
//! # Examples
//!
//! ```no_run
//! use fdfs_client::{Metadata, TrackerClient};
//! use std::fs::File;
//!
//! # fn main() -> Result<(), fdfs_client::Error> {
//! let client = TrackerClient::new(&["10.0.0.1:22122".parse()?])?;
//! let storage = client.get_store_storage(None)?;
//!
//! let file = File::open("photo.jpg")?;
//! let size = file.metadata()?.len();
//! let uploaded = storage.upload(file, size, "jpg", &Metadata::new())?;
//! println!("{}", uploaded);
//!
//! client.close()?;
//! # Ok(())
//! # }
//! ```
#![warn(missing_docs)]
extern crate byteorder;
extern crate fdfs_core;
extern crate fdfs_pool;
extern crate fdfs_protocol;
extern crate hex;
extern crate md5;
extern crate prometrics;
extern crate rand;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_yaml;
#[macro_use]
extern crate slog;
extern crate socket2;
#[cfg(test)]
extern crate tempdir;
#[macro_use]
extern crate trackable;

pub use crate::client::{TrackerClient, TrackerClientBuilder};
pub use crate::config::ClientConfig;
pub use crate::connection::ConnectionOptions;
pub use crate::error::{Error, ErrorKind};
pub use crate::group::TrackerGroup;
pub use crate::metrics::Metrics;
pub use crate::registry::PoolRegistry;
pub use crate::server::DEFAULT_MAX_RETRIES;
pub use crate::server_addr::ServerAddr;
pub use crate::storage::{generate_slave_filename, generate_token, StorageServer, UploadedFile};
pub use crate::tracker::TrackerServer;
pub use fdfs_pool::PoolConfig;
pub use fdfs_protocol::{Metadata, MetadataMode};

pub mod connection;
pub mod registry;

mod client;
mod config;
mod error;
mod group;
mod metrics;
mod server;
mod server_addr;
mod storage;
#[cfg(test)]
mod test_util;
mod tracker;

/// クレート固有の`Result`型。
pub type Result<T> = ::std::result::Result<T, Error>;
