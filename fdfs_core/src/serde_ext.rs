//! Extensions for serde.
//!
//! 設定ファイル中の時間はミリ秒単位の整数で表現する。
//! YAML で文字列として書かれた値(e.g., `"5000"`)も受け付ける。
use serde::de::{self, Visitor};
use std::fmt;
use std::time::Duration;

struct MillisVisitor;
impl<'de> Visitor<'de> for MillisVisitor {
    type Value = Duration;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a non-negative integer of milliseconds")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
        Ok(Duration::from_millis(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
        if v < 0 {
            return Err(E::custom(format!("negative duration: {}", v)));
        }
        Ok(Duration::from_millis(v as u64))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
        from_millis(v).map_err(E::custom)
    }
}

fn to_millis(duration: &Duration) -> u64 {
    duration.as_secs() * 1000 + u64::from(duration.subsec_millis())
}

fn from_millis(millis: &str) -> Result<Duration, std::num::ParseIntError> {
    millis.trim().parse::<u64>().map(Duration::from_millis)
}

/// A module for serializing/deserializing a `Duration` as milliseconds.
pub mod duration_millis {
    use serde::{Deserializer, Serialize, Serializer};
    use std::time::Duration;

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        super::to_millis(value).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(super::MillisVisitor)
    }
}

/// `Option<Duration>` 版の [`duration_millis`]。
///
/// `None` は「制限なし」を意味する設定値に使う。
pub mod option_duration_millis {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;
    use std::time::Duration;

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_some(&super::to_millis(d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_option(OptionVisitor)
    }

    struct OptionVisitor;
    impl<'de> Visitor<'de> for OptionVisitor {
        type Value = Option<Duration>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "null or a non-negative integer of milliseconds")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer
                .deserialize_any(super::MillisVisitor)
                .map(Some)
        }
    }
}
