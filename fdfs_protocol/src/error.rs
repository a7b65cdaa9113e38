use std::string::FromUtf8Error;
use trackable::error::TrackableError;
use trackable::error::{ErrorKind as TrackableErrorKind, ErrorKindExt};

/// クレート固有の`Error`型。
#[derive(Debug, Clone, TrackableError)]
pub struct Error(TrackableError<ErrorKind>);
impl From<FromUtf8Error> for Error {
    fn from(f: FromUtf8Error) -> Self {
        ErrorKind::MalformedFrame.cause(f).into()
    }
}

/// エラーの種類。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// 入力値が不正(e.g., 予約長を超えるボディ)。
    InvalidInput,

    /// 受信データがフレームとして解釈できない。
    MalformedFrame,
}
impl TrackableErrorKind for ErrorKind {}
