//! トラッカー/ストレージサーバとの間でやり取りされるバイナリプロトコルの定義。
//!
//! フレームの形式は以下の通り(整数は全てビッグエンディアン):
//!
//! ```text
//! body_length(8) + command(1) + status(1) + body(body_length)
//! ```
//!
//! このクレートはI/Oを一切行わない。
#![warn(missing_docs)]
extern crate byteorder;
#[macro_use]
extern crate trackable;

pub use crate::error::{Error, ErrorKind};
pub use crate::frame::{decode_frame, encode_frame, ReceiveBuffer, Response, HEADER_SIZE, STATUS_SUCCESS};
pub use crate::metadata::{pack_metadata, unpack_metadata, Metadata, MetadataMode};

pub mod command;
pub mod field;

mod error;
mod frame;
mod metadata;

/// クレート固有の`Result`型。
pub type Result<T> = ::std::result::Result<T, Error>;
