use rand::{self, Rng};
use slog::Logger;

use crate::tracker::TrackerServer;
use crate::{ErrorKind, Result};

/// 設定された全トラッカーの中から、利用可能なものを選ぶ。
#[derive(Debug)]
pub struct TrackerGroup {
    logger: Logger,
    trackers: Vec<TrackerServer>,
}
impl TrackerGroup {
    /// 新しい`TrackerGroup`インスタンスを生成する。
    pub fn new(logger: Logger, trackers: Vec<TrackerServer>) -> Self {
        TrackerGroup { logger, trackers }
    }

    /// 設定されているトラッカー群を返す。
    pub fn trackers(&self) -> &[TrackerServer] {
        &self.trackers
    }

    /// 利用可能なトラッカーを一つ選ぶ。
    ///
    /// 候補の中から一様ランダムに選び、状態確認に失敗したものは候補から外して選び直す。
    /// 候補は呼び出しの度に、設定された全トラッカーに戻される。
    pub fn select_tracker(&self) -> Result<TrackerServer> {
        let mut working = self.trackers.iter().collect::<Vec<_>>();
        let mut rng = rand::thread_rng();
        while !working.is_empty() {
            let i = rng.gen_range(0, working.len());
            if working[i].check_status() {
                return Ok(working[i].clone());
            }
            let failed = working.remove(i);
            info!(self.logger, "Tracker is unavailable";
                  "tracker" => failed.addr().to_string(), "remaining" => working.len());
        }
        track_panic!(
            ErrorKind::NoValidTrackers,
            "all of {} trackers are unavailable",
            self.trackers.len()
        );
    }

    /// 全てのトラッカーを閉じる。
    ///
    /// 途中で失敗しても全てのトラッカーを閉じ、最初のエラーを返す。
    pub fn close(&self) -> Result<()> {
        let mut result = Ok(());
        for tracker in &self.trackers {
            if let Err(e) = tracker.close() {
                if result.is_ok() {
                    result = Err(track!(e));
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionOptions;
    use crate::registry::PoolRegistry;
    use crate::test_util::{self, MockServer, Reply};
    use crate::ServerAddr;
    use fdfs_pool::PoolConfig;
    use slog::Discard;
    use std::sync::Arc;
    use trackable::result::TestResult;

    fn tracker_group(addrs: &[ServerAddr]) -> Result<TrackerGroup> {
        let logger = Logger::root(Discard, o!());
        let registry = Arc::new(PoolRegistry::new(
            logger.clone(),
            PoolConfig::default(),
            ConnectionOptions::default(),
            None,
        ));
        let mut trackers = Vec::new();
        for addr in addrs {
            trackers.push(track!(TrackerServer::new(
                &logger,
                addr.clone(),
                Arc::clone(&registry)
            ))?);
        }
        Ok(TrackerGroup::new(logger, trackers))
    }

    #[test]
    fn select_only_healthy_tracker() -> TestResult {
        let healthy = track!(MockServer::start(|_| Reply::ok(Vec::new())))?;
        let unhealthy = track!(MockServer::start(|_| Reply::status(2)))?;
        let unreachable = track!(test_util::unused_addr())?;

        let group = track!(tracker_group(&[
            unreachable.clone(),
            healthy.addr().clone(),
            unhealthy.addr().clone()
        ]))?;
        for _ in 0..10 {
            let tracker = track!(group.select_tracker())?;
            assert_eq!(tracker.addr(), healthy.addr());
        }
        Ok(())
    }

    #[test]
    fn no_valid_trackers() -> TestResult {
        let unhealthy = track!(MockServer::start(|_| Reply::Close))?;
        let unreachable0 = track!(test_util::unused_addr())?;
        let unreachable1 = track!(test_util::unused_addr())?;

        let group = track!(tracker_group(&[
            unreachable0,
            unhealthy.addr().clone(),
            unreachable1
        ]))?;
        for _ in 0..3 {
            let e = group.select_tracker().err().map(|e| e.kind().clone());
            assert_eq!(e, Some(ErrorKind::NoValidTrackers));
        }

        let group = track!(tracker_group(&[]))?;
        let e = group.select_tracker().err().map(|e| e.kind().clone());
        assert_eq!(e, Some(ErrorKind::NoValidTrackers));
        Ok(())
    }

    #[test]
    fn close_closes_all_trackers() -> TestResult {
        let healthy = track!(MockServer::start(|_| Reply::ok(Vec::new())))?;
        let group = track!(tracker_group(&[healthy.addr().clone()]))?;
        track!(group.select_tracker())?;
        track!(group.close())?;

        let e = group.select_tracker().err().map(|e| e.kind().clone());
        assert_eq!(e, Some(ErrorKind::NoValidTrackers));
        Ok(())
    }
}
