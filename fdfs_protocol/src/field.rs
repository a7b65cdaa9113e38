//! ボディ内の固定長フィールドの読み書き。
use byteorder::{BigEndian, ByteOrder};

use crate::{ErrorKind, Result};

/// グループ名フィールドのバイト数。
pub const GROUP_NAME_LEN: usize = 16;

/// 拡張子フィールドのバイト数。
pub const FILE_EXT_LEN: usize = 6;

/// 文字列をUTF-8で`width`バイトの固定長フィールドとして書き込む。
///
/// 長すぎる場合はバイト単位で切り詰め、短い場合は`0`で埋める。
pub fn put_fixed_str(buf: &mut Vec<u8>, s: &str, width: usize) {
    let bytes = s.as_bytes();
    let len = bytes.len().min(width);
    buf.extend_from_slice(&bytes[..len]);
    buf.resize(buf.len() + (width - len), 0);
}

/// 固定長フィールドを文字列として読み込む。末尾の`NUL`と空白は取り除かれる。
pub fn read_fixed_str(bytes: &[u8]) -> Result<String> {
    let s = track!(decode_str(bytes))?;
    Ok(s.trim_end_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_owned())
}

/// UTF-8バイト列を文字列に変換する。
pub fn decode_str(bytes: &[u8]) -> Result<String> {
    let s = track!(String::from_utf8(bytes.to_vec()).map_err(crate::Error::from))?;
    Ok(s)
}

/// `bytes[offset..offset + 8]`をビッグエンディアンの整数として読み込む。
pub fn read_u64_at(bytes: &[u8], offset: usize) -> Result<u64> {
    track_assert!(
        bytes.len() >= offset + 8,
        ErrorKind::MalformedFrame,
        "no u64 at offset {}: len={}",
        offset,
        bytes.len()
    );
    Ok(BigEndian::read_u64(&bytes[offset..offset + 8]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackable::result::TestResult;

    #[test]
    fn put_fixed_str_pads_and_truncates() {
        let mut buf = Vec::new();
        put_fixed_str(&mut buf, "jpg", FILE_EXT_LEN);
        assert_eq!(buf, b"jpg\0\0\0");

        let mut buf = vec![1];
        put_fixed_str(&mut buf, "a-very-long-group-name", GROUP_NAME_LEN);
        assert_eq!(buf.len(), 1 + GROUP_NAME_LEN);
        assert_eq!(&buf[1..], b"a-very-long-grou");
    }

    #[test]
    fn read_fixed_str_trims_padding() -> TestResult {
        assert_eq!(track!(read_fixed_str(b"group1\0\0\0\0"))?, "group1");
        assert_eq!(track!(read_fixed_str(b"10.0.0.1  \0"))?, "10.0.0.1");
        assert_eq!(track!(read_fixed_str(b"\0\0"))?, "");
        assert!(read_fixed_str(&[0xff, 0xfe]).is_err());
        Ok(())
    }

    #[test]
    fn read_u64_at_works() -> TestResult {
        let bytes = [9, 0, 0, 0, 0, 0, 0, 0x59, 0x4a, 7];
        assert_eq!(track!(read_u64_at(&bytes, 1))?, 0x594a);
        assert!(read_u64_at(&bytes, 3).is_err());
        Ok(())
    }
}
