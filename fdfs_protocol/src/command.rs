//! プロトコルのコマンドコード。
#![allow(missing_docs)]

pub const UPLOAD_FILE: u8 = 11;
pub const SET_METADATA: u8 = 13;
pub const GET_METADATA: u8 = 15;
pub const QUIT: u8 = 82;
pub const QUERY_STORE_WITHOUT_GROUP: u8 = 101;
pub const QUERY_STORE_WITH_GROUP: u8 = 104;
pub const ACTIVE_TEST: u8 = 111;

/// ログやエラーメッセージ用のコマンド名を返す。
pub fn name(command: u8) -> &'static str {
    match command {
        UPLOAD_FILE => "UPLOAD_FILE",
        SET_METADATA => "SET_METADATA",
        GET_METADATA => "GET_METADATA",
        QUIT => "QUIT",
        QUERY_STORE_WITHOUT_GROUP => "QUERY_STORE_WITHOUT_GROUP",
        QUERY_STORE_WITH_GROUP => "QUERY_STORE_WITH_GROUP",
        ACTIVE_TEST => "ACTIVE_TEST",
        100 => "RESPONSE",
        _ => "UNKNOWN",
    }
}
