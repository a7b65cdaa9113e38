use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Instant;
use trackable::error::ErrorKindExt;

use crate::{Error, ErrorKind, PoolConfig};

/// プールされるオブジェクトの生成・検証・破棄を担うトレイト。
pub trait ObjectFactory {
    /// プールされるオブジェクト。
    type Object;

    /// 生成・破棄時のエラー。プール自身のエラーもこの型に変換して返される。
    type Error: From<Error>;

    /// 新しいオブジェクトを生成する。
    fn make(&self) -> Result<Self::Object, Self::Error>;

    /// オブジェクトがまだ利用可能かどうかを判定する。
    fn validate(&self, object: &Self::Object) -> bool;

    /// オブジェクトを破棄する。
    fn destroy(&self, object: Self::Object) -> Result<(), Self::Error>;
}

struct State<T> {
    idle: VecDeque<T>,
    active: usize,
    closed: bool,
}

/// オブジェクトプール。
///
/// 貸し出したオブジェクトは、必ず以下のいずれかで戻す必要がある:
///
/// - [`release`](Pool::release): 再利用のために返却する
/// - [`invalidate`](Pool::invalidate): ファクトリの`destroy`で破棄する
/// - [`abandon`](Pool::abandon): `destroy`を呼ばずに枠だけを解放する(オブジェクトはdropされる)
///
/// いずれも行わなかった場合、その分だけ`max_total`の枠が消費されたままになる。
pub struct Pool<F: ObjectFactory> {
    factory: F,
    config: PoolConfig,
    state: Mutex<State<F::Object>>,
    returned: Condvar,
}
impl<F: ObjectFactory> Pool<F> {
    /// 新しい`Pool`インスタンスを生成する。
    ///
    /// この時点ではオブジェクトは生成されない(`min_idle`分の事前生成は[`prewarm`](Pool::prewarm)で行う)。
    pub fn new(factory: F, config: PoolConfig) -> Self {
        Pool {
            factory,
            config,
            state: Mutex::new(State {
                idle: VecDeque::new(),
                active: 0,
                closed: false,
            }),
            returned: Condvar::new(),
        }
    }

    /// プールの設定を返す。
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// オブジェクトを借りる。
    ///
    /// 待機中のオブジェクトがあればそれを、無ければ新しく生成したものを返す。
    /// 上限に達している場合は、設定に従って返却を待つか`Exhausted`エラーを返す。
    pub fn borrow(&self) -> Result<F::Object, F::Error> {
        let deadline = self.config.max_wait.map(|d| Instant::now() + d);
        let mut state = self.lock()?;
        loop {
            if state.closed {
                return Err(failure(ErrorKind::Closed, "pool is closed"));
            }

            if let Some(object) = state.idle.pop_front() {
                state.active += 1;
                drop(state);
                if !self.config.test_on_borrow || self.factory.validate(&object) {
                    return Ok(object);
                }
                let _ = self.factory.destroy(object);
                state = self.lock()?;
                state.active -= 1;
                continue;
            }

            if self.has_capacity(&state) {
                state.active += 1;
                drop(state);
                return match self.factory.make() {
                    Ok(object) => Ok(object),
                    Err(e) => {
                        self.release_slot()?;
                        Err(e)
                    }
                };
            }

            if !self.config.block_when_exhausted {
                return Err(failure(
                    ErrorKind::Exhausted,
                    &format!("all {} objects are in use", self.config.max_total),
                ));
            }
            state = match deadline {
                None => self
                    .returned
                    .wait(state)
                    .map_err(|_| F::Error::from(poisoned()))?,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(failure(
                            ErrorKind::Exhausted,
                            &format!("timed out waiting for one of {} objects", self.config.max_total),
                        ));
                    }
                    self.returned
                        .wait_timeout(state, deadline - now)
                        .map_err(|_| F::Error::from(poisoned()))?
                        .0
                }
            };
        }
    }

    /// 借りていたオブジェクトを返却する。
    ///
    /// プールが閉じられている場合や、待機中のオブジェクト数が`max_idle`に達している場合は破棄される。
    pub fn release(&self, object: F::Object) -> Result<(), F::Error> {
        if self.config.test_on_return && !self.factory.validate(&object) {
            return self.invalidate(object);
        }

        let mut state = self.lock()?;
        state.active = state.active.saturating_sub(1);
        let surplus = if state.closed || state.idle.len() >= self.config.max_idle {
            Some(object)
        } else {
            state.idle.push_back(object);
            None
        };
        drop(state);
        self.returned.notify_one();

        if let Some(object) = surplus {
            self.factory.destroy(object)?;
        }
        Ok(())
    }

    /// 借りていたオブジェクトを無効化し、破棄する。
    pub fn invalidate(&self, object: F::Object) -> Result<(), F::Error> {
        self.release_slot()?;
        self.factory.destroy(object)
    }

    /// 借りていたオブジェクトを、ファクトリの`destroy`を経由せずに手放す。
    pub fn abandon(&self, object: F::Object) -> Result<(), F::Error> {
        drop(object);
        self.release_slot()
    }

    /// `count`個のオブジェクトを生成し、待機中に加える。
    ///
    /// 上限に達した場合はその時点で止める。実際に加えた数を返す。
    pub fn prewarm(&self, count: usize) -> Result<usize, F::Error> {
        let mut added = 0;
        for _ in 0..count {
            {
                let mut state = self.lock()?;
                if state.closed {
                    return Err(failure(ErrorKind::Closed, "pool is closed"));
                }
                if !self.has_capacity(&state) {
                    break;
                }
                state.active += 1;
            }

            let object = match self.factory.make() {
                Ok(object) => object,
                Err(e) => {
                    self.release_slot()?;
                    return Err(e);
                }
            };
            let mut state = self.lock()?;
            state.active -= 1;
            if state.closed || state.idle.len() >= self.config.max_idle {
                drop(state);
                self.factory.destroy(object)?;
                break;
            }
            state.idle.push_back(object);
            added += 1;
        }
        self.returned.notify_all();
        Ok(added)
    }

    /// プールを閉じる。
    ///
    /// 以降の貸し出しは失敗し、待機中のオブジェクトは全て破棄される。
    /// 貸出中のオブジェクトは、返却(または無効化)された時点で破棄される。
    pub fn close(&self) -> Result<(), F::Error> {
        let idle = {
            let mut state = self.lock()?;
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            state.idle.drain(..).collect::<Vec<_>>()
        };
        self.returned.notify_all();

        let mut result = Ok(());
        for object in idle {
            if let Err(e) = self.factory.destroy(object) {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    /// プールが閉じられているかどうかを判定する。
    pub fn is_closed(&self) -> bool {
        self.state.lock().map(|s| s.closed).unwrap_or(true)
    }

    /// 待機中のオブジェクト数を返す。
    pub fn num_idle(&self) -> usize {
        self.state.lock().map(|s| s.idle.len()).unwrap_or(0)
    }

    /// 貸出中のオブジェクト数を返す。
    pub fn num_active(&self) -> usize {
        self.state.lock().map(|s| s.active).unwrap_or(0)
    }

    fn has_capacity(&self, state: &State<F::Object>) -> bool {
        self.config.max_total == 0 || state.active + state.idle.len() < self.config.max_total
    }

    fn release_slot(&self) -> Result<(), F::Error> {
        let mut state = self.lock()?;
        state.active = state.active.saturating_sub(1);
        drop(state);
        self.returned.notify_one();
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<State<F::Object>>, F::Error> {
        self.state.lock().map_err(|_| F::Error::from(poisoned()))
    }
}
impl<F: ObjectFactory> fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Pool {{ idle: {}, active: {}, closed: {} }}",
            self.num_idle(),
            self.num_active(),
            self.is_closed()
        )
    }
}

fn failure<E: From<Error>>(kind: ErrorKind, reason: &str) -> E {
    E::from(track!(Error::from(kind.cause(reason.to_owned()))))
}

fn poisoned() -> Error {
    track!(Error::from(ErrorKind::Other.cause("pool state is poisoned")))
}
