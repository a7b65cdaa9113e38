use std::time::Duration;

/// [`Pool`](crate::Pool)の設定。
///
/// 既定値は、プロセス全体で共有される暗黙の設定ではなく、
/// 呼び出し側が一度だけ生成して明示的に渡すことを想定している。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// 同時に存在できるオブジェクト数の上限(貸出中 + 待機中)。
    ///
    /// `0`の場合は無制限。
    #[serde(default = "default_max_total")]
    pub max_total: usize,

    /// 待機中として保持しておくオブジェクト数の上限。
    ///
    /// これを超えて返却されたオブジェクトは破棄される。
    #[serde(default = "default_max_idle")]
    pub max_idle: usize,

    /// プール生成時に作成しておくオブジェクトの数。
    #[serde(default)]
    pub min_idle: usize,

    /// 上限に達している場合に、返却を待つかどうか。
    #[serde(default = "default_block_when_exhausted")]
    pub block_when_exhausted: bool,

    /// 返却待ちの最大時間。`None`の場合は無期限に待つ。
    #[serde(
        rename = "max_wait_millis",
        default,
        with = "fdfs_core::serde_ext::option_duration_millis"
    )]
    pub max_wait: Option<Duration>,

    /// 待機中のオブジェクトを貸し出す前に検証するかどうか。
    #[serde(default = "default_test_on_borrow")]
    pub test_on_borrow: bool,

    /// 返却されたオブジェクトを待機中に戻す前に検証するかどうか。
    #[serde(default)]
    pub test_on_return: bool,
}
impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_total: default_max_total(),
            max_idle: default_max_idle(),
            min_idle: 0,
            block_when_exhausted: default_block_when_exhausted(),
            max_wait: None,
            test_on_borrow: default_test_on_borrow(),
            test_on_return: false,
        }
    }
}

fn default_max_total() -> usize {
    8
}

fn default_max_idle() -> usize {
    8
}

fn default_block_when_exhausted() -> bool {
    true
}

fn default_test_on_borrow() -> bool {
    true
}
