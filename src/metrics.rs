//! Prometheus metrics for client-server transactions.
use fdfs_protocol::command;
use prometrics::metrics::{Counter, MetricBuilder};
use std::collections::HashMap;

use crate::Result;

/// 計測対象となるコマンド群。
const COMMANDS: &[u8] = &[
    command::UPLOAD_FILE,
    command::SET_METADATA,
    command::GET_METADATA,
    command::QUERY_STORE_WITHOUT_GROUP,
    command::QUERY_STORE_WITH_GROUP,
];

#[derive(Debug, Clone)]
struct CommandMetrics {
    requests_total: Counter,
    failed_requests_total: Counter,
}

/// Prometheus metrics for client-server transactions.
///
/// 全てのサーバハンドルとコネクションプールで共有される。
#[derive(Debug, Clone)]
pub struct Metrics {
    commands: HashMap<u8, CommandMetrics>,
    failed_active_tests_total: Counter,
    opened_connections_total: Counter,
    closed_connections_total: Counter,
}
impl Metrics {
    /// Makes a new `Metrics` instance.
    pub fn new() -> Result<Self> {
        let mut builder = MetricBuilder::new();
        builder.namespace("fdfs").subsystem("client");

        let mut commands = HashMap::new();
        for &c in COMMANDS {
            let requests_total = track!(builder
                .counter("requests_total")
                .label("command", command::name(c))
                .default_registry()
                .finish())?;
            let failed_requests_total = track!(builder
                .counter("failed_requests_total")
                .label("command", command::name(c))
                .default_registry()
                .finish())?;
            commands.insert(
                c,
                CommandMetrics {
                    requests_total,
                    failed_requests_total,
                },
            );
        }
        let failed_active_tests_total = track!(builder
            .counter("failed_active_tests_total")
            .default_registry()
            .finish())?;
        let opened_connections_total = track!(builder
            .counter("opened_connections_total")
            .default_registry()
            .finish())?;
        let closed_connections_total = track!(builder
            .counter("closed_connections_total")
            .default_registry()
            .finish())?;
        Ok(Metrics {
            commands,
            failed_active_tests_total,
            opened_connections_total,
            closed_connections_total,
        })
    }

    /// `command`のリクエストの送信数を返す。
    pub fn requests(&self, command: u8) -> u64 {
        self.commands
            .get(&command)
            .map_or(0, |m| m.requests_total.value() as u64)
    }

    /// `command`のリクエストのうち、失敗したものの数を返す。
    pub fn failed_requests(&self, command: u8) -> u64 {
        self.commands
            .get(&command)
            .map_or(0, |m| m.failed_requests_total.value() as u64)
    }

    /// 失敗した生存確認の数を返す。
    pub fn failed_active_tests(&self) -> u64 {
        self.failed_active_tests_total.value() as u64
    }

    /// 開いたコネクションの数を返す。
    pub fn opened_connections(&self) -> u64 {
        self.opened_connections_total.value() as u64
    }

    /// 閉じたコネクションの数を返す。
    pub fn closed_connections(&self) -> u64 {
        self.closed_connections_total.value() as u64
    }

    pub(crate) fn request_sent(&self, command: u8) {
        if let Some(m) = self.commands.get(&command) {
            m.requests_total.increment();
        }
    }

    pub(crate) fn request_failed(&self, command: u8) {
        if let Some(m) = self.commands.get(&command) {
            m.failed_requests_total.increment();
        }
    }

    pub(crate) fn active_test_failed(&self) {
        self.failed_active_tests_total.increment();
    }

    pub(crate) fn connection_opened(&self) {
        self.opened_connections_total.increment();
    }

    pub(crate) fn connection_closed(&self) {
        self.closed_connections_total.increment();
    }
}
