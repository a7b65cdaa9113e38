use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use std::fmt;

use crate::command;
use crate::{ErrorKind, Result};

/// ヘッダ部のバイト数(`body_length(8) + command(1) + status(1)`)。
pub const HEADER_SIZE: usize = 10;

/// 成功を表すステータス値。リクエストは常にこの値を送る。
pub const STATUS_SUCCESS: u8 = 0;

/// リクエストフレームをエンコードする。
///
/// ヘッダの`body_length`には常に`reserved_body_len`が書き込まれる。
///
/// `use_reserved_len`が`true`の場合、ボディは`reserved_body_len`まで右側をゼロで埋められる。
/// `false`の場合は`body`の長さ分だけがフレームに含まれ、残りのボディは
/// 呼び出し側が別途(e.g., ファイルストリームとして)送信する必要がある。
pub fn encode_frame(
    status: u8,
    command: u8,
    body: Option<&[u8]>,
    reserved_body_len: u64,
    use_reserved_len: bool,
) -> Result<Vec<u8>> {
    let body = body.unwrap_or(&[]);
    track_assert!(
        body.len() as u64 <= reserved_body_len,
        ErrorKind::InvalidInput,
        "body is longer than reserved: command={}, body_len={}, reserved={}",
        command::name(command),
        body.len(),
        reserved_body_len
    );

    let frame_body_len = if use_reserved_len {
        reserved_body_len as usize
    } else {
        body.len()
    };
    let mut frame = Vec::with_capacity(HEADER_SIZE + frame_body_len);
    // `Vec<u8>`への書き込みは失敗しない
    let _ = frame.write_u64::<BigEndian>(reserved_body_len);
    frame.push(command);
    frame.push(status);
    frame.extend_from_slice(body);
    frame.resize(HEADER_SIZE + frame_body_len, 0);
    Ok(frame)
}

/// 完全に受信済みのバイト列をレスポンスとしてデコードする。
///
/// `bytes`は少なくとも`HEADER_SIZE + body_length`バイトを含んでいる必要がある。
pub fn decode_frame(bytes: &[u8]) -> Result<Response> {
    track_assert!(
        bytes.len() >= HEADER_SIZE,
        ErrorKind::MalformedFrame,
        "too short header: {} bytes",
        bytes.len()
    );
    let body_len = BigEndian::read_u64(&bytes[0..8]);
    let command = bytes[8];
    let status = bytes[9];

    let available = (bytes.len() - HEADER_SIZE) as u64;
    track_assert!(
        body_len <= available,
        ErrorKind::MalformedFrame,
        "body is shorter than declared: command={}, declared={}, received={}",
        command::name(command),
        body_len,
        available
    );
    let body = if body_len == 0 {
        None
    } else {
        let end = HEADER_SIZE + body_len as usize;
        Some(bytes[HEADER_SIZE..end].to_vec())
    };
    Ok(Response {
        command,
        status,
        body,
    })
}

/// デコード済みのレスポンス。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// コマンド。
    pub command: u8,

    /// ステータス。`0`以外は失敗を表す。
    pub status: u8,

    /// ボディ。長さが`0`の場合は`None`。
    pub body: Option<Vec<u8>>,
}
impl Response {
    /// 成功を示すレスポンスかどうかを判定する。
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    /// ボディを取り出す。ボディが無い場合は空のバイト列を返す。
    pub fn into_body(self) -> Vec<u8> {
        self.body.unwrap_or_default()
    }
}

/// 分割して届くレスポンスを蓄積するバッファ。
///
/// ヘッダ(10バイト)が揃った時点で`body_length`を読み取り、
/// `HEADER_SIZE + body_length`バイトに達するまで受信を続ける。
#[derive(Default, Clone)]
pub struct ReceiveBuffer {
    bytes: Vec<u8>,
}
impl ReceiveBuffer {
    /// 空のバッファを生成する。
    pub fn new() -> Self {
        Self::default()
    }

    /// 受信したチャンクを追加し、まだ受信を続ける必要があるかどうかを返す。
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        self.bytes.extend_from_slice(chunk);
        !self.is_complete()
    }

    /// フレーム全体が揃っているかどうかを判定する。
    pub fn is_complete(&self) -> bool {
        match self.declared_body_len() {
            None => false,
            Some(body_len) => {
                (self.bytes.len() as u64) >= (HEADER_SIZE as u64).saturating_add(body_len)
            }
        }
    }

    /// ヘッダが揃っていれば宣言されたボディ長を返す。
    pub fn declared_body_len(&self) -> Option<u64> {
        if self.bytes.len() < HEADER_SIZE {
            None
        } else {
            Some(BigEndian::read_u64(&self.bytes[0..8]))
        }
    }

    /// これまでに受信したバイト列を返す。
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// 蓄積したバイト列をレスポンスとしてデコードする。
    pub fn decode(&self) -> Result<Response> {
        track!(decode_frame(&self.bytes))
    }
}
impl fmt::Debug for ReceiveBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "ReceiveBuffer {{ received: {}, declared_body_len: {:?} }}",
            self.bytes.len(),
            self.declared_body_len()
        )
    }
}
