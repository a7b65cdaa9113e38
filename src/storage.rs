//! ストレージサーバ。
use byteorder::{BigEndian, WriteBytesExt};
use fdfs_protocol::command;
use fdfs_protocol::field::{self, FILE_EXT_LEN, GROUP_NAME_LEN};
use fdfs_protocol::{pack_metadata, unpack_metadata, Metadata, MetadataMode};
use md5::{Digest, Md5};
use slog::Logger;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::{self, Read};
use std::sync::Arc;

use crate::registry::PoolRegistry;
use crate::server::ServerCore;
use crate::{Error, ErrorKind, Result, ServerAddr};

/// アップロードリクエストの固定長部分のバイト数(`store_path(1) + file_size(8) + ext(6)`)。
const UPLOAD_HEADER_LEN: u64 = 1 + 8 + FILE_EXT_LEN as u64;

/// スレーブファイル名を生成可能なマスターファイル名の最小文字数。
const MIN_MASTER_FILENAME_LEN: usize = 34;

/// アップロード成功時に返されるファイルの識別子。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UploadedFile {
    /// グループ名。
    pub group_name: String,

    /// グループ内でのファイル名。
    pub filename: String,
}
impl fmt::Display for UploadedFile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.group_name, self.filename)
    }
}

/// ストレージサーバのハンドル。
///
/// 通常は[`TrackerServer::get_store_storage`](crate::TrackerServer::get_store_storage)経由で取得する。
#[derive(Clone)]
pub struct StorageServer {
    core: ServerCore,
    store_path: u8,
}
impl StorageServer {
    /// 新しい`StorageServer`インスタンスを生成する。
    pub fn new(
        logger: &Logger,
        addr: ServerAddr,
        store_path: u8,
        registry: Arc<PoolRegistry>,
    ) -> Result<Self> {
        let core = track!(ServerCore::new(logger, addr, registry))?;
        Ok(StorageServer { core, store_path })
    }

    /// ストレージサーバのアドレスを返す。
    pub fn addr(&self) -> &ServerAddr {
        self.core.addr()
    }

    /// アップロード先として使われるストアパスのインデックスを返す。
    pub fn store_path(&self) -> u8 {
        self.store_path
    }

    /// 有効なコネクションが得られるかどうかを判定する。
    pub fn check_status(&self) -> bool {
        self.core.check_status()
    }

    /// ファイルをアップロードする。
    ///
    /// `stream`からは先頭の`size`バイトだけが送信される。
    /// `stream`が`size`バイトに満たない場合は`WriteError`となり、使ったコネクションは破棄される。
    /// `stream`は成否に関わらず、このメソッドから戻る時点で閉じられる。
    ///
    /// `metadata`が空でない場合は、アップロード後にメタデータを上書き設定する。
    pub fn upload<R: Read>(
        &self,
        stream: R,
        size: u64,
        ext: &str,
        metadata: &Metadata,
    ) -> Result<UploadedFile> {
        let mut body = Vec::with_capacity(UPLOAD_HEADER_LEN as usize);
        body.push(self.store_path);
        track!(body.write_u64::<BigEndian>(size).map_err(Error::from))?;
        field::put_fixed_str(&mut body, ext.trim(), FILE_EXT_LEN);

        let reserved_body_len = track_assert_some!(
            UPLOAD_HEADER_LEN.checked_add(size),
            ErrorKind::InvalidInput,
            "too large file: size={}",
            size
        );
        let response = track!(self.core.transact(
            command::UPLOAD_FILE,
            Some(&body[..]),
            reserved_body_len,
            Some(stream)
        ))?;
        track_assert!(
            response.len() >= GROUP_NAME_LEN,
            ErrorKind::MalformedFrame,
            "too short upload response: {} bytes",
            response.len()
        );
        let group_name =
            track!(field::read_fixed_str(&response[..GROUP_NAME_LEN]).map_err(Error::from))?;
        let filename = track!(field::decode_str(&response[GROUP_NAME_LEN..]).map_err(Error::from))?;
        let file = UploadedFile {
            group_name,
            filename,
        };
        info!(self.core.logger(), "File uploaded"; "file" => file.to_string(), "size" => size);

        if !metadata.is_empty() {
            track!(self.override_or_merge_metadata(
                MetadataMode::Overwrite,
                &file.group_name,
                &file.filename,
                metadata
            ))?;
        }
        Ok(file)
    }

    /// ファイルのメタデータを上書き、もしくはマージする。
    pub fn override_or_merge_metadata(
        &self,
        mode: MetadataMode,
        group_name: &str,
        filename: &str,
        metadata: &Metadata,
    ) -> Result<()> {
        let packed = pack_metadata(metadata);
        let mut body = Vec::with_capacity(8 + 8 + 1 + GROUP_NAME_LEN + filename.len() + packed.len());
        track!(body
            .write_u64::<BigEndian>(filename.len() as u64)
            .map_err(Error::from))?;
        track!(body
            .write_u64::<BigEndian>(packed.len() as u64)
            .map_err(Error::from))?;
        body.push(mode.flag());
        field::put_fixed_str(&mut body, group_name, GROUP_NAME_LEN);
        body.extend_from_slice(filename.as_bytes());
        body.extend_from_slice(packed.as_bytes());

        track!(self.core.transact(
            command::SET_METADATA,
            Some(&body[..]),
            body.len() as u64,
            None::<io::Empty>
        ))?;
        Ok(())
    }

    /// ファイルのメタデータを取得する。
    pub fn get_metadata(&self, group_name: &str, filename: &str) -> Result<Metadata> {
        let mut body = Vec::with_capacity(GROUP_NAME_LEN + filename.len());
        field::put_fixed_str(&mut body, group_name, GROUP_NAME_LEN);
        body.extend_from_slice(filename.as_bytes());

        let response = track!(self.core.transact(
            command::GET_METADATA,
            Some(&body[..]),
            body.len() as u64,
            None::<io::Empty>
        ))?;
        let packed = track!(field::decode_str(&response).map_err(Error::from))?;
        let metadata = track!(unpack_metadata(&packed).map_err(Error::from))?;
        Ok(metadata)
    }

    /// このストレージサーバのコネクションプールを閉じる。
    pub fn close(&self) -> Result<()> {
        track!(self.core.close())
    }
}
impl PartialEq for StorageServer {
    fn eq(&self, other: &Self) -> bool {
        self.core == other.core
    }
}
impl Eq for StorageServer {}
impl Hash for StorageServer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core.hash(state);
    }
}
impl fmt::Debug for StorageServer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "StorageServer {{ addr: {}, store_path: {} }}",
            self.addr(),
            self.store_path
        )
    }
}

/// ファイルへのアクセストークンを生成する。
///
/// `filename`、`secret`、`timestamp_millis`(10進数表記)をこの順に連結したもののMD5ダイジェスト(16進数小文字)。
///
/// # Examples
///
/// ```
/// use fdfs_client::generate_token;
///
/// let token = generate_token("M00/00/00/abc.jpg", 1_577_836_800_000, "secret");
/// assert_eq!(token.len(), 32);
/// assert_eq!(token, generate_token("M00/00/00/abc.jpg", 1_577_836_800_000, "secret"));
/// ```
pub fn generate_token(filename: &str, timestamp_millis: i64, secret: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(filename.as_bytes());
    hasher.update(secret.as_bytes());
    hasher.update(timestamp_millis.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// マスターファイル名とサフィックスから、スレーブファイル名を生成する。
///
/// マスターファイル名の末尾7文字の中に`.`があれば、拡張子の直前にサフィックスを挿入する。
/// 無ければ末尾にサフィックスを付与する。
///
/// # Errors
///
/// マスターファイル名が34文字未満の場合は`ErrorKind::InvalidInput`を返す。
pub fn generate_slave_filename(master_filename: &str, suffix: &str) -> Result<String> {
    let len = master_filename.chars().count();
    track_assert!(
        len >= MIN_MASTER_FILENAME_LEN,
        ErrorKind::InvalidInput,
        "too short master filename: {:?} ({} chars)",
        master_filename,
        len
    );

    let tail_start = master_filename
        .char_indices()
        .rev()
        .nth(FILE_EXT_LEN)
        .map_or(0, |(i, _)| i);
    let slave = match master_filename[tail_start..].rfind('.') {
        Some(i) => {
            let (name, ext) = master_filename.split_at(tail_start + i);
            format!("{}{}{}", name, suffix, ext)
        }
        None => format!("{}{}", master_filename, suffix),
    };
    Ok(slave)
}
