//! 関数評価セッション
//!
//! デバッグ対象へのリモート呼び出しを一度に一つだけ実行し、タイムアウトを適用します。
//! 注入された呼び出しが使えるコールスタックのスロットは一つしかないため、
//! キューではなく排他的なスロットで単一実行を保証します。

use crate::{EvalConfig, Error, PauseCycle};
use funceval_target::{
    CallReturn, CancelToken, FuncEvalId, FuncEvalOptions, MethodId, ObjectId, RemoteValue,
    ThreadId, Transport, TransportError,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

#[derive(Debug, Default)]
struct StatsInner {
    in_flight: AtomicBool,
    method_invoke_counter: AtomicU64,
}

/// 関数評価の診断情報
///
/// UIなど制御スレッド以外からも参照できます。
#[derive(Debug, Clone, Default)]
pub struct EvalStats {
    inner: Arc<StatsInner>,
}

impl EvalStats {
    /// 関数評価が実行中かどうか
    pub fn is_evaluating(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// 完了した（タイムアウトを含む）メソッド呼び出しの累計
    pub fn method_invoke_counter(&self) -> u64 {
        self.inner.method_invoke_counter.load(Ordering::SeqCst)
    }

    fn record_invocation(&self) {
        self.inner.method_invoke_counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// 単一の評価スロット
#[derive(Debug, Default)]
pub struct SessionSlot {
    stats: EvalStats,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &EvalStats {
        &self.stats
    }

    /// スロットが使用中かどうか
    pub fn is_open(&self) -> bool {
        self.stats.is_evaluating()
    }

    /// スロットを確保する
    ///
    /// 既に使用中の場合は `None` を返します。返されたガードを破棄するとスロットは解放されます。
    pub fn try_open(&self) -> Option<SlotGuard> {
        self.stats
            .inner
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| SlotGuard {
                stats: self.stats.clone(),
            })
    }
}

/// 確保済みの評価スロット
#[derive(Debug)]
pub struct SlotGuard {
    stats: EvalStats,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.stats.inner.in_flight.store(false, Ordering::SeqCst);
    }
}

/// リモート呼び出しの完了状態
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// 上限時間内に完了した
    Finished(CallReturn),
    /// 上限時間内に完了しなかった（呼び出しはデバッグ対象内でまだ実行中かもしれない）
    TimedOut,
}

/// 開いている関数評価リソース
///
/// `close` を呼ばずに破棄された場合（パニックによる巻き戻しなど）も、Dropで解放を試みます。
struct FuncEvalResource<'a> {
    transport: &'a dyn Transport,
    id: FuncEvalId,
    closed: bool,
}

impl<'a> FuncEvalResource<'a> {
    fn open(
        transport: &'a dyn Transport,
        thread: ThreadId,
        options: &FuncEvalOptions,
    ) -> Result<Self, TransportError> {
        let id = transport.open_func_eval(thread, options)?;
        Ok(Self {
            transport,
            id,
            closed: false,
        })
    }

    fn call(
        &self,
        method: &MethodId,
        this: Option<ObjectId>,
        args: &[RemoteValue],
        timeout: Duration,
    ) -> Result<Completion, Error> {
        let rx = self.transport.call_method(self.id, method, this, args)?;
        match rx.recv_timeout(timeout) {
            Ok(result) => Ok(Completion::Finished(result?)),
            Err(RecvTimeoutError::Timeout) => Ok(Completion::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected.into()),
        }
    }

    fn close(mut self) -> Result<(), TransportError> {
        self.closed = true;
        self.transport.close_func_eval(self.id)
    }
}

impl Drop for FuncEvalResource<'_> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.transport.close_func_eval(self.id) {
                error!("failed to release func-eval #{}: {}", self.id.0, e);
            }
        }
    }
}

/// 呼び出しの完了を停止サイクルに反映する
///
/// タイムアウトマーカーを設定する唯一の経路です。呼び出し元に制御が戻る前に実行されます。
fn on_func_eval_complete(cycle: &mut PauseCycle, completion: &Result<Completion, Error>) {
    if let Ok(Completion::TimedOut) = completion {
        warn!("func-eval timed out in {}, disabling func-eval until continue", cycle.id());
        cycle.set_timed_out_marker();
    }
}

/// リモート呼び出しを一回実行する
///
/// 呼び出し元は直前に `check_func_eval` が成功していることを保証しなければなりません。
///
/// # Panics
/// 別の評価が実行中の場合（プログラミングエラー）
#[allow(clippy::too_many_arguments)]
pub(crate) fn invoke(
    transport: &dyn Transport,
    slot: &SessionSlot,
    config: &EvalConfig,
    cycle: &mut PauseCycle,
    thread: ThreadId,
    this: Option<ObjectId>,
    method: &MethodId,
    args: &[RemoteValue],
) -> Result<Completion, Error> {
    let Some(_guard) = slot.try_open() else {
        panic!("func-eval of {} started while another evaluation is in flight", method);
    };

    let options = FuncEvalOptions {
        timeout: config.timeout,
        suspend_other_threads: config.suspend_other_threads,
        cancel: CancelToken::none(),
    };
    debug!("invoke {} on {} ({:?})", method, thread, this);

    let resource = FuncEvalResource::open(transport, thread, &options)?;
    let completion = resource.call(method, this, args, options.timeout);
    on_func_eval_complete(cycle, &completion);
    // 発行されて完了した（タイムアウトを含む）呼び出しだけを数える
    if completion.is_ok() {
        slot.stats().record_invocation();
    }

    resource.close().map_err(Error::ReleaseFailed)?;
    completion
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PauseCycleId;
    use funceval_target::{Loaded, MethodBehavior, SimDebuggee, SimObject, StopReason};

    fn setup() -> (SimDebuggee, ObjectId, PauseCycle) {
        let sim = SimDebuggee::with_sample_program();
        let obj = sim.add_object(SimObject::new("Sample.Customer"));
        let cycle = PauseCycle::new(PauseCycleId(1), StopReason::Breakpoint);
        (sim, obj, cycle)
    }

    fn short_config() -> EvalConfig {
        EvalConfig::default().with_timeout(Duration::from_millis(50))
    }

    #[test]
    fn test_slot_is_exclusive() {
        let slot = SessionSlot::new();
        let guard = slot.try_open().expect("first open");
        assert!(slot.is_open());
        assert!(slot.try_open().is_none());
        drop(guard);
        assert!(!slot.is_open());
        assert!(slot.try_open().is_some());
    }

    #[test]
    fn test_invoke_completes_and_releases_resource() {
        let (sim, obj, mut cycle) = setup();
        let slot = SessionSlot::new();
        let completion = invoke(
            &sim,
            &slot,
            &short_config(),
            &mut cycle,
            ThreadId(1),
            Some(obj),
            &MethodId::new("System.Object", "ToString"),
            &[],
        )
        .unwrap();

        match completion {
            Completion::Finished(CallReturn::Returned(Loaded::Value(handle))) => {
                assert_eq!(handle.value, RemoteValue::String("Sample.Customer".into()));
            }
            other => panic!("unexpected completion: {:?}", other),
        }
        assert!(!cycle.has_timed_out_marker());
        assert!(!slot.is_open());
        assert_eq!(slot.stats().method_invoke_counter(), 1);
        assert_eq!(sim.open_func_eval_count(), 0);
        assert_eq!(sim.closed_func_eval_count(), 1);
    }

    #[test]
    fn test_invoke_suspends_other_threads() {
        let (sim, obj, mut cycle) = setup();
        let slot = SessionSlot::new();
        invoke(
            &sim,
            &slot,
            &short_config(),
            &mut cycle,
            ThreadId(1),
            Some(obj),
            &MethodId::new("Sample.Customer", "GetOrderCount"),
            &[],
        )
        .unwrap();

        let opened = sim.opened_func_evals();
        assert_eq!(opened.len(), 1);
        assert!(opened[0].suspend_other_threads);
        assert_eq!(opened[0].timeout, Duration::from_millis(50));
        assert!(!opened[0].cancel.is_cancelled());
    }

    #[test]
    fn test_timeout_sets_marker_and_still_releases() {
        let (sim, obj, mut cycle) = setup();
        let slot = SessionSlot::new();
        let completion = invoke(
            &sim,
            &slot,
            &short_config(),
            &mut cycle,
            ThreadId(1),
            Some(obj),
            &MethodId::new("Sample.Customer", "WaitForever"),
            &[],
        )
        .unwrap();

        assert_eq!(completion, Completion::TimedOut);
        assert!(cycle.has_timed_out_marker());
        assert_eq!(sim.closed_func_eval_count(), 1);
        assert_eq!(slot.stats().method_invoke_counter(), 1);
    }

    #[test]
    fn test_release_failure_is_fatal() {
        let (sim, obj, mut cycle) = setup();
        sim.set_fail_close(true);
        let slot = SessionSlot::new();
        let err = invoke(
            &sim,
            &slot,
            &short_config(),
            &mut cycle,
            ThreadId(1),
            Some(obj),
            &MethodId::new("Sample.Customer", "GetOrderCount"),
            &[],
        )
        .unwrap_err();
        assert!(err.is_fatal());
        assert!(!slot.is_open());
    }

    #[test]
    fn test_unknown_method_is_transport_error() {
        let (sim, obj, mut cycle) = setup();
        let slot = SessionSlot::new();
        let err = invoke(
            &sim,
            &slot,
            &short_config(),
            &mut cycle,
            ThreadId(1),
            Some(obj),
            &MethodId::new("Sample.Customer", "Missing"),
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::NoSuchMethod(_))));
        assert!(!err.is_fatal());
        assert_eq!(sim.open_func_eval_count(), 0);
        assert_eq!(slot.stats().method_invoke_counter(), 0);
    }

    #[test]
    fn test_invoke_passes_arguments_in_order() {
        let (sim, obj, mut cycle) = setup();
        let slot = SessionSlot::new();
        let method = MethodId::new("Sample.Customer", "GetOrderCount");
        let args = [RemoteValue::I32(1), RemoteValue::I64(2), RemoteValue::Char('x')];
        invoke(
            &sim,
            &slot,
            &short_config(),
            &mut cycle,
            ThreadId(1),
            Some(obj),
            &method,
            &args,
        )
        .unwrap();

        let calls = sim.recorded_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, method);
        assert_eq!(calls[0].this, Some(obj));
        assert_eq!(calls[0].args, args.to_vec());
    }

    #[test]
    fn test_slow_call_within_timeout() {
        let (sim, obj, mut cycle) = setup();
        sim.define_method(
            MethodId::new("Sample.Customer", "Slow"),
            MethodBehavior::Delay(
                Duration::from_millis(10),
                Box::new(MethodBehavior::Return(RemoteValue::I64(7))),
            ),
        );
        let slot = SessionSlot::new();
        let completion = invoke(
            &sim,
            &slot,
            &EvalConfig::default(),
            &mut cycle,
            ThreadId(1),
            Some(obj),
            &MethodId::new("Sample.Customer", "Slow"),
            &[],
        )
        .unwrap();
        assert!(matches!(completion, Completion::Finished(_)));
        assert!(!cycle.has_timed_out_marker());
    }

    #[test]
    #[should_panic(expected = "another evaluation is in flight")]
    fn test_invoke_while_slot_open_panics() {
        let (sim, obj, mut cycle) = setup();
        let slot = SessionSlot::new();
        let _held = slot.try_open();
        let _ = invoke(
            &sim,
            &slot,
            &short_config(),
            &mut cycle,
            ThreadId(1),
            Some(obj),
            &MethodId::new("System.Object", "ToString"),
            &[],
        );
    }
}
