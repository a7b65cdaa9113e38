//! スレッド間で共有可能な、ブロッキング型のオブジェクトプール。
//!
//! オブジェクトの生成・検証・破棄は[`ObjectFactory`]の実装に委譲される。
//! `fdfs_client`では、サーバアドレス毎のコネクションプールとして使われる。
#![warn(missing_docs)]
extern crate fdfs_core;
extern crate serde;
#[macro_use]
extern crate serde_derive;
#[cfg(test)]
extern crate serde_yaml;
#[macro_use]
extern crate trackable;

pub use crate::config::PoolConfig;
pub use crate::error::{Error, ErrorKind};
pub use crate::pool::{ObjectFactory, Pool};

mod config;
mod error;
mod pool;

/// クレート固有の`Result`型。
pub type Result<T> = ::std::result::Result<T, Error>;
