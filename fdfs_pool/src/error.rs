use trackable::error::ErrorKind as TrackableErrorKind;
use trackable::error::TrackableError;

/// クレート固有の`Error`型。
#[derive(Debug, Clone, TrackableError)]
pub struct Error(TrackableError<ErrorKind>);

/// エラーの種類。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// 貸し出し可能なオブジェクトが無く、待機もできなかった。
    Exhausted,

    /// プールが既に閉じられている。
    Closed,

    /// その他のエラー(e.g., ロックの汚染)。
    Other,
}
impl TrackableErrorKind for ErrorKind {}
