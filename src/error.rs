use std::io;
use trackable::error::TrackableError;
use trackable::error::{ErrorKind as TrackableErrorKind, ErrorKindExt};

/// クレート固有の`Error`型。
#[derive(Debug, Clone, TrackableError)]
pub struct Error(TrackableError<ErrorKind>);
impl From<io::Error> for Error {
    fn from(f: io::Error) -> Self {
        ErrorKind::Other.cause(f).into()
    }
}
impl From<fdfs_protocol::Error> for Error {
    fn from(f: fdfs_protocol::Error) -> Self {
        let kind = match *f.kind() {
            fdfs_protocol::ErrorKind::InvalidInput => ErrorKind::InvalidInput,
            fdfs_protocol::ErrorKind::MalformedFrame => ErrorKind::MalformedFrame,
        };
        kind.takes_over(f).into()
    }
}
impl From<fdfs_pool::Error> for Error {
    fn from(f: fdfs_pool::Error) -> Self {
        let kind = match *f.kind() {
            fdfs_pool::ErrorKind::Exhausted => ErrorKind::PoolExhausted,
            fdfs_pool::ErrorKind::Closed | fdfs_pool::ErrorKind::Other => ErrorKind::PoolError,
        };
        kind.takes_over(f).into()
    }
}
impl From<prometrics::Error> for Error {
    fn from(f: prometrics::Error) -> Self {
        ErrorKind::Other.takes_over(f).into()
    }
}
impl From<serde_yaml::Error> for Error {
    fn from(f: serde_yaml::Error) -> Self {
        ErrorKind::InvalidInput.cause(f).into()
    }
}
impl From<std::num::ParseIntError> for Error {
    fn from(f: std::num::ParseIntError) -> Self {
        ErrorKind::InvalidInput.cause(f).into()
    }
}

/// エラーの種類。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// サーバへの接続に失敗した。
    ConnectError,

    /// リクエストの送信に失敗した。
    WriteError,

    /// レスポンスの受信に失敗した。
    ReadError,

    /// レスポンスが宣言された長さに満たない、もしくは期待するレイアウトではない。
    MalformedFrame,

    /// サーバが`0`以外のステータスを返した。
    Protocol {
        /// サーバが返したステータス。
        status: u8,
    },

    /// コネクションプールに空きが無い。
    PoolExhausted,

    /// コネクションプールが閉じられている、もしくは存在しない。
    PoolError,

    /// リトライ上限までに有効なコネクションを得られなかった。
    ConnectionUnavailable,

    /// 利用可能なトラッカーが一つも無い。
    NoValidTrackers,

    /// 引数や設定値が不正。
    InvalidInput,

    /// その他のエラー。
    Other,
}
impl TrackableErrorKind for ErrorKind {}
