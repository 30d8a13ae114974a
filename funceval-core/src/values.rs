//! 値のライフサイクル管理
//!
//! 停止中に作成された値ハンドルを追跡し、再開時にまとめて解放します。
//! ハンドルの参照先は再開後に移動・回収される可能性があるため、
//! 再開をまたいで値を使い回すことはできません。

use crate::{Error, PauseCycleId};
use funceval_target::{
    HandleId, Loaded, ObjectId, RemoteHandle, RemoteValue, Transport, TransportError,
    ValueLocation,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// 値ID（エンジン内で一意）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u64);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

#[derive(Debug)]
struct TrackedValue {
    id: ValueId,
    cycle: PauseCycleId,
    location: ValueLocation,
    handle: RemoteHandle,
    closed: AtomicBool,
}

impl TrackedValue {
    /// ハンドルを解放する。既に解放済みなら何もしない
    fn dispose(&self, transport: &dyn Transport) -> Result<bool, TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        transport.release(self.handle.id)?;
        Ok(true)
    }
}

#[derive(Debug, Clone)]
enum ValueKind {
    Tracked(Arc<TrackedValue>),
    /// オブジェクトが存在しない位置を表す値。デバッグ対象側のリソースを持たない
    SyntheticNull {
        id: ValueId,
        cycle: PauseCycleId,
        location: ValueLocation,
        type_name: String,
    },
}

/// デバッグ値
///
/// 停止中のデバッグ対象のメモリ上の位置と、その実行時の型を参照します。
/// 作成された停止サイクルが終わると、デバッグ対象由来のデータへのアクセスは
/// `Error::StaleValueAccess` で失敗します。
#[derive(Debug, Clone)]
pub struct DebugValue {
    kind: ValueKind,
}

impl DebugValue {
    pub fn id(&self) -> ValueId {
        match &self.kind {
            ValueKind::Tracked(v) => v.id,
            ValueKind::SyntheticNull { id, .. } => *id,
        }
    }

    /// 作成された停止サイクル
    pub fn cycle(&self) -> PauseCycleId {
        match &self.kind {
            ValueKind::Tracked(v) => v.cycle,
            ValueKind::SyntheticNull { cycle, .. } => *cycle,
        }
    }

    pub fn location(&self) -> &ValueLocation {
        match &self.kind {
            ValueKind::Tracked(v) => &v.location,
            ValueKind::SyntheticNull { location, .. } => location,
        }
    }

    /// 実行時の型名（合成nullの場合は宣言型）
    pub fn type_name(&self) -> &str {
        match &self.kind {
            ValueKind::Tracked(v) => &v.handle.type_name,
            ValueKind::SyntheticNull { type_name, .. } => type_name,
        }
    }

    pub fn is_synthetic_null(&self) -> bool {
        matches!(self.kind, ValueKind::SyntheticNull { .. })
    }

    /// 解放済みかどうか（合成nullは解放の対象にならない）
    pub fn is_disposed(&self) -> bool {
        match &self.kind {
            ValueKind::Tracked(v) => v.closed.load(Ordering::SeqCst),
            ValueKind::SyntheticNull { .. } => false,
        }
    }

    fn live(&self) -> Result<Option<&RemoteHandle>, Error> {
        match &self.kind {
            ValueKind::Tracked(v) if v.closed.load(Ordering::SeqCst) => {
                Err(Error::StaleValueAccess)
            }
            ValueKind::Tracked(v) => Ok(Some(&v.handle)),
            ValueKind::SyntheticNull { .. } => Ok(None),
        }
    }

    /// リモート値を取得する
    pub fn value(&self) -> Result<RemoteValue, Error> {
        Ok(self
            .live()?
            .map(|handle| handle.value.clone())
            .unwrap_or(RemoteValue::Null))
    }

    /// 参照しているオブジェクトのID
    pub fn object_id(&self) -> Result<Option<ObjectId>, Error> {
        Ok(self.live()?.and_then(|handle| handle.value.as_object()))
    }

    /// トランスポート上のハンドルID（合成nullの場合は `None`）
    pub fn handle_id(&self) -> Result<Option<HandleId>, Error> {
        Ok(self.live()?.map(|handle| handle.id))
    }
}

impl fmt::Display for DebugValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value() {
            Ok(value) => write!(f, "{} = {} ({})", self.id(), value, self.type_name()),
            Err(_) => write!(f, "{} = <stale> ({})", self.id(), self.type_name()),
        }
    }
}

/// 値のライフサイクルトラッカー
///
/// 値の登録は制御スレッド以外の経路から要求されることがあるため、
/// 登録集合だけをロックで保護します。
pub struct ValueTracker {
    transport: Arc<dyn Transport>,
    values: Mutex<Vec<Arc<TrackedValue>>>,
    next_id: AtomicU64,
}

impl ValueTracker {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            values: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<TrackedValue>>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> ValueId {
        ValueId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// 新しく作成された値ハンドルを登録する
    pub fn track(
        &self,
        cycle: PauseCycleId,
        location: ValueLocation,
        handle: RemoteHandle,
    ) -> DebugValue {
        let value = Arc::new(TrackedValue {
            id: self.next_id(),
            cycle,
            location,
            handle,
            closed: AtomicBool::new(false),
        });
        self.lock().push(value.clone());
        DebugValue {
            kind: ValueKind::Tracked(value),
        }
    }

    /// 合成nullを作成する（登録はしない）
    pub fn synthetic_null(
        &self,
        cycle: PauseCycleId,
        location: ValueLocation,
        type_name: impl Into<String>,
    ) -> DebugValue {
        DebugValue {
            kind: ValueKind::SyntheticNull {
                id: self.next_id(),
                cycle,
                location,
                type_name: type_name.into(),
            },
        }
    }

    /// 読み込み結果をデバッグ値として包む
    pub fn wrap(&self, cycle: PauseCycleId, location: ValueLocation, loaded: Loaded) -> DebugValue {
        match loaded {
            Loaded::Null { declared_type } => self.synthetic_null(cycle, location, declared_type),
            Loaded::Value(handle) => self.track(cycle, location, handle),
        }
    }

    /// 登録中の値の数
    pub fn tracked_count(&self) -> usize {
        self.lock().len()
    }

    /// 登録中の値の一覧
    pub fn snapshot(&self) -> Vec<DebugValue> {
        self.lock()
            .iter()
            .map(|v| DebugValue {
                kind: ValueKind::Tracked(v.clone()),
            })
            .collect()
    }

    /// 値を個別に解放する
    ///
    /// 合成nullや解放済みの値に対しては何もしません。
    pub fn dispose(&self, value: &DebugValue) -> Result<(), TransportError> {
        if let ValueKind::Tracked(v) = &value.kind {
            v.dispose(self.transport.as_ref())?;
        }
        Ok(())
    }

    /// 再開の直前に、登録中の値をすべて解放する
    ///
    /// 登録集合をロック内で取り出して空にし、解放はロックの外で行います。
    /// 解放した値の数を返します。
    pub fn flush_on_continue(&self) -> usize {
        let drained = std::mem::take(&mut *self.lock());

        let mut released = 0;
        for value in &drained {
            match value.dispose(self.transport.as_ref()) {
                Ok(true) => released += 1,
                Ok(false) => {}
                Err(e) => warn!("failed to release value {} ({}): {}", value.id, value.location, e),
            }
        }
        debug!("flushed {} value(s), released {}", drained.len(), released);
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use funceval_target::{SimDebuggee, ThreadId};

    fn local(index: usize) -> ValueLocation {
        ValueLocation::Local {
            thread: ThreadId(1),
            frame: 0,
            index,
        }
    }

    fn load(sim: &SimDebuggee, tracker: &ValueTracker, index: usize) -> DebugValue {
        let loaded = sim.load(&local(index)).unwrap();
        tracker.wrap(PauseCycleId(1), local(index), loaded)
    }

    #[test]
    fn test_flush_releases_each_value_once() {
        let sim = Arc::new(SimDebuggee::with_sample_program());
        let tracker = ValueTracker::new(sim.clone());

        let a = load(&sim, &tracker, 0);
        let b = load(&sim, &tracker, 1);
        assert_eq!(tracker.tracked_count(), 2);
        assert_eq!(a.value().unwrap(), a.value().unwrap());
        assert_eq!(b.value().unwrap(), RemoteValue::I32(42));

        assert_eq!(tracker.flush_on_continue(), 2);
        assert_eq!(tracker.tracked_count(), 0);
        assert_eq!(sim.live_handle_count(), 0);
        assert_eq!(sim.released_handle_count(), 2);

        assert!(matches!(a.value(), Err(Error::StaleValueAccess)));
        assert!(matches!(b.object_id(), Err(Error::StaleValueAccess)));
        assert!(a.is_disposed());
        assert_eq!(a.type_name(), "Sample.Customer");

        // 二度目のflushでは何も解放しない
        assert_eq!(tracker.flush_on_continue(), 0);
        assert_eq!(sim.released_handle_count(), 2);
    }

    #[test]
    fn test_explicit_dispose_then_flush_releases_once() {
        let sim = Arc::new(SimDebuggee::with_sample_program());
        let tracker = ValueTracker::new(sim.clone());

        let a = load(&sim, &tracker, 0);
        tracker.dispose(&a).unwrap();
        tracker.dispose(&a).unwrap();
        assert!(a.is_disposed());

        assert_eq!(tracker.flush_on_continue(), 0);
        assert_eq!(sim.released_handle_count(), 1);
    }

    #[test]
    fn test_synthetic_null_is_not_tracked() {
        let sim = Arc::new(SimDebuggee::with_sample_program());
        let tracker = ValueTracker::new(sim.clone());

        let null = load(&sim, &tracker, 2);
        assert!(null.is_synthetic_null());
        assert_eq!(null.type_name(), "System.String");
        assert_eq!(tracker.tracked_count(), 0);

        tracker.dispose(&null).unwrap();
        assert!(!null.is_disposed());
        tracker.flush_on_continue();
        assert_eq!(null.value().unwrap(), RemoteValue::Null);
        assert_eq!(null.handle_id().unwrap(), None);
        assert_eq!(sim.released_handle_count(), 0);
    }

    #[test]
    fn test_concurrent_track_and_flush() {
        let sim = Arc::new(SimDebuggee::with_sample_program());
        let tracker = Arc::new(ValueTracker::new(sim.clone()));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let sim = sim.clone();
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        load(&sim, &tracker, 1);
                    }
                })
            })
            .collect();
        let mut released = tracker.flush_on_continue();
        for worker in workers {
            worker.join().unwrap();
        }
        released += tracker.flush_on_continue();

        assert_eq!(released, 100);
        assert_eq!(sim.live_handle_count(), 0);
        assert_eq!(sim.released_handle_count(), 100);
    }

    #[test]
    fn test_display() {
        let sim = Arc::new(SimDebuggee::with_sample_program());
        let tracker = ValueTracker::new(sim.clone());
        let v = load(&sim, &tracker, 1);
        assert_eq!(v.to_string(), format!("{} = 42 (System.Int32)", v.id()));
        tracker.flush_on_continue();
        assert_eq!(v.to_string(), format!("{} = <stale> (System.Int32)", v.id()));
    }
}
