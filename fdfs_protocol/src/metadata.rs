use std::collections::HashMap;

use crate::{ErrorKind, Result};

/// ファイルに紐付くメタデータ。
pub type Metadata = HashMap<String, String>;

/// キーと値の区切り文字。
pub const FIELD_SEPARATOR: char = '\u{2}';

/// エントリ同士の区切り文字。
pub const RECORD_SEPARATOR: char = '\u{1}';

/// メタデータ設定時の動作。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataMode {
    /// 既存のメタデータを全て置き換える。
    Overwrite,

    /// 既存のメタデータにマージする。
    Merge,
}
impl MetadataMode {
    /// ワイヤ上でのフラグ値(`'O'` or `'M'`)を返す。
    pub fn flag(self) -> u8 {
        match self {
            MetadataMode::Overwrite => b'O',
            MetadataMode::Merge => b'M',
        }
    }
}

/// メタデータを`key\u{2}value`を`\u{1}`で連結した文字列に変換する。
///
/// 空のメタデータは空文字列になる。
pub fn pack_metadata(metadata: &Metadata) -> String {
    let mut packed = String::new();
    for (key, value) in metadata {
        if !packed.is_empty() {
            packed.push(RECORD_SEPARATOR);
        }
        packed.push_str(key);
        packed.push(FIELD_SEPARATOR);
        packed.push_str(value);
    }
    packed
}

/// [`pack_metadata`]で作られた文字列をメタデータに戻す。
pub fn unpack_metadata(packed: &str) -> Result<Metadata> {
    let mut metadata = Metadata::new();
    if packed.is_empty() {
        return Ok(metadata);
    }
    for record in packed.split(RECORD_SEPARATOR) {
        let mut fields = record.splitn(2, FIELD_SEPARATOR);
        let key = fields.next().unwrap_or("");
        let value = track_assert_some!(
            fields.next(),
            ErrorKind::MalformedFrame,
            "no field separator in metadata record: {:?}",
            record
        );
        metadata.insert(key.to_owned(), value.to_owned());
    }
    Ok(metadata)
}
