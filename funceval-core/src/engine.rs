//! 関数評価エンジンのメインロジック

use crate::session::{self, Completion, EvalStats, SessionSlot};
use crate::values::{DebugValue, ValueTracker};
use crate::{check_func_eval, ControlThread, EvalConfig, Error, PauseCycle, PauseCycleId, Refusal};
use funceval_target::{
    CallReturn, MethodId, ObjectId, RemoteValue, StopReason, ThreadId, Transport, ValueLocation,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// リモート呼び出しの結果
#[derive(Debug, Clone)]
pub enum Invocation {
    /// メソッドが値を返した
    Returned(DebugValue),
    /// メソッドが例外を送出した（例外オブジェクト）
    Threw(DebugValue),
    /// 上限時間内に完了しなかった
    TimedOut,
}

impl Invocation {
    pub fn timed_out(&self) -> bool {
        matches!(self, Invocation::TimedOut)
    }

    pub fn value(&self) -> Option<&DebugValue> {
        match self {
            Invocation::Returned(v) | Invocation::Threw(v) => Some(v),
            Invocation::TimedOut => None,
        }
    }
}

/// 完了したメソッド呼び出し
#[derive(Debug, Clone)]
pub struct CallOutput {
    pub value: DebugValue,
    /// `value` が送出された例外かどうか
    pub threw: bool,
}

/// 関数評価エンジン
///
/// 生成したスレッドが制御スレッドになり、公開操作はすべて制御スレッドから呼ぶ必要があります。
pub struct EvalEngine {
    /// デバッグ対象との通信
    transport: Arc<dyn Transport>,
    /// 制御スレッド
    control: ControlThread,
    /// 関数評価の設定
    config: EvalConfig,
    /// 現在の停止サイクル（実行中は None）
    pause: Option<PauseCycle>,
    /// 最後に払い出した停止サイクルID
    last_cycle: u64,
    /// 単一の評価スロット
    slot: SessionSlot,
    /// 値のライフサイクルトラッカー
    values: Arc<ValueTracker>,
}

impl EvalEngine {
    /// 新しいエンジンを作成する
    pub fn new(transport: Arc<dyn Transport>, config: EvalConfig) -> Self {
        Self {
            values: Arc::new(ValueTracker::new(transport.clone())),
            transport,
            control: ControlThread::current(),
            config,
            pause: None,
            last_cycle: 0,
            slot: SessionSlot::new(),
        }
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// デバッグ対象が停止中かどうか
    pub fn is_paused(&self) -> bool {
        self.control.verify_access();
        self.pause.is_some()
    }

    /// 現在の停止サイクル
    pub fn pause_cycle(&self) -> Option<&PauseCycle> {
        self.control.verify_access();
        self.pause.as_ref()
    }

    /// デバッグ対象が停止したときに呼ぶ
    ///
    /// 新しい停止サイクルを作成します。
    pub fn on_paused(&mut self, reason: StopReason) -> PauseCycleId {
        self.control.verify_access();
        if let Some(previous) = &self.pause {
            // 再開通知の取りこぼし。古い値を無効化してから新しいサイクルに入る
            warn!("paused again without continue (still in {})", previous.id());
            self.on_continuing();
        }

        self.last_cycle += 1;
        let id = PauseCycleId(self.last_cycle);
        info!("debuggee paused: {} ({:?})", id, reason);
        self.pause = Some(PauseCycle::new(id, reason));
        id
    }

    /// デバッグ対象を再開する直前に呼ぶ
    ///
    /// 停止サイクル中に作成した値をすべて解放し、停止サイクルを終了します。
    /// 解放した値の数を返します。
    pub fn on_continuing(&mut self) -> usize {
        self.control.verify_access();
        let released = self.values.flush_on_continue();
        if let Some(cycle) = self.pause.take() {
            debug!(
                "leaving {} (timed out: {}), released {} value(s)",
                cycle.id(),
                cycle.has_timed_out_marker(),
                released
            );
        }
        released
    }

    /// デバッグ対象の実行を再開する
    ///
    /// 再開前に解放した値の数を返します。
    pub fn continue_execution(&mut self) -> Result<usize, Error> {
        let released = self.on_continuing();
        self.transport.resume()?;
        Ok(released)
    }

    /// 関数評価を開始してよいか判定する
    pub fn check_func_eval(&self) -> Result<(), Refusal> {
        self.control.verify_access();
        check_func_eval(self.pause.as_ref(), self.slot.stats())
    }

    /// メソッドを呼び出す
    ///
    /// 直前に `check_func_eval` が成功している必要があります。
    /// 呼び出しの間、制御スレッドは最大で設定されたタイムアウトまでブロックします。
    /// タイムアウトした場合、この停止サイクルの間は関数評価が無効になります。
    ///
    /// # Panics
    /// 別の評価が実行中の場合
    pub fn invoke(
        &mut self,
        thread: ThreadId,
        this: Option<ObjectId>,
        method: &MethodId,
        args: &[RemoteValue],
    ) -> Result<Invocation, Error> {
        self.control.verify_access();
        let Some(cycle) = self.pause.as_mut() else {
            return Err(Refusal::NotPaused.into());
        };
        let cycle_id = cycle.id();

        let completion = session::invoke(
            self.transport.as_ref(),
            &self.slot,
            &self.config,
            cycle,
            thread,
            this,
            method,
            args,
        )?;

        let location = ValueLocation::EvalResult {
            method: method.clone(),
        };
        Ok(match completion {
            Completion::Finished(CallReturn::Returned(loaded)) => {
                Invocation::Returned(self.values.wrap(cycle_id, location, loaded))
            }
            Completion::Finished(CallReturn::Threw(exception)) => {
                debug!("{} threw {}", method, exception.type_name);
                Invocation::Threw(self.values.track(cycle_id, location, exception))
            }
            Completion::TimedOut => Invocation::TimedOut,
        })
    }

    /// 前提条件を確認してからメソッドを呼び出す
    ///
    /// 確認と呼び出しの間に他の処理は挟まりません。タイムアウトは
    /// `Error::EvaluationTimedOut` として返します。
    pub fn call_method(
        &mut self,
        thread: ThreadId,
        this: Option<ObjectId>,
        method: &MethodId,
        args: &[RemoteValue],
    ) -> Result<CallOutput, Error> {
        self.check_func_eval()?;
        match self.invoke(thread, this, method, args)? {
            Invocation::Returned(value) => Ok(CallOutput { value, threw: false }),
            Invocation::Threw(value) => Ok(CallOutput { value, threw: true }),
            Invocation::TimedOut => Err(Error::EvaluationTimedOut),
        }
    }

    /// 位置から値を読み込んでデバッグ値を作成する
    ///
    /// オブジェクトが存在しない位置からは、追跡されない合成nullが返ります。
    pub fn create_value(&self, location: ValueLocation) -> Result<DebugValue, Error> {
        self.control.verify_access();
        let cycle = self.pause.as_ref().ok_or(Refusal::NotPaused)?;
        let loaded = self.transport.load(&location)?;
        Ok(self.values.wrap(cycle.id(), location, loaded))
    }

    /// 関数評価の診断情報
    pub fn stats(&self) -> EvalStats {
        self.slot.stats().clone()
    }

    /// 関数評価が実行中かどうか
    pub fn is_evaluating(&self) -> bool {
        self.slot.is_open()
    }

    /// 完了したメソッド呼び出しの累計
    pub fn method_invoke_counter(&self) -> u64 {
        self.slot.stats().method_invoke_counter()
    }

    /// 値のライフサイクルトラッカーを取得する
    pub fn value_tracker(&self) -> &Arc<ValueTracker> {
        &self.values
    }
}
