//! 各 fdfs crate に共通する機能・定義を提供するクレート。
extern crate serde;
#[cfg(test)]
#[macro_use]
extern crate serde_derive;
#[cfg(test)]
extern crate serde_yaml;

pub mod serde_ext;
