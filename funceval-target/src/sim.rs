//! メモリ上で動作するデバッグ対象
//!
//! 実際のプロセスの代わりに、オブジェクトグラフとメソッドの振る舞いを
//! スクリプトとして与えて `Transport` を実装します。
//! 払い出したハンドルや関数評価リソースの開閉を記録するので、
//! エンジンのライフサイクルを検証するテストで利用できます。

use crate::{
    CallResult, CallReturn, FuncEvalId, FuncEvalOptions, HandleId, Loaded, MethodId, ObjectId,
    RemoteHandle, RemoteValue, Result, ThreadId, Transport, TransportError, ValueLocation,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::mpsc::{self, Receiver, SendError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// 文字列オブジェクトとして返す値の型名
const STRING_TYPE: &str = "System.String";

/// 呼び出し履歴などを保持する最大件数
const HISTORY_LIMIT: usize = 64;

/// メソッド呼び出しの振る舞い
#[derive(Debug, Clone)]
pub enum MethodBehavior {
    /// 値を返す
    Return(RemoteValue),
    /// nullを返す
    ReturnNull { return_type: String },
    /// `this` の型名を文字列として返す
    ToString,
    /// 指定した型の例外を送出する
    Throw { exception_type: String },
    /// 指定時間後に内側の振る舞いで完了する
    Delay(Duration, Box<MethodBehavior>),
    /// 完了しない
    Hang,
}

/// 発行されたメソッド呼び出しの記録
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: MethodId,
    pub this: Option<ObjectId>,
    pub args: Vec<RemoteValue>,
}

#[derive(Debug, Clone)]
struct SimField {
    declared_type: String,
    value: RemoteValue,
}

/// シミュレーション上のオブジェクト
#[derive(Debug, Clone)]
pub struct SimObject {
    type_name: String,
    fields: BTreeMap<String, SimField>,
    element_type: Option<String>,
    elements: Vec<RemoteValue>,
}

impl SimObject {
    /// 通常のオブジェクトを作成する
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
            element_type: None,
            elements: Vec::new(),
        }
    }

    /// 配列オブジェクトを作成する
    pub fn array(element_type: impl Into<String>, elements: Vec<RemoteValue>) -> Self {
        let element_type = element_type.into();
        Self {
            type_name: format!("{}[]", element_type),
            fields: BTreeMap::new(),
            element_type: Some(element_type),
            elements,
        }
    }

    /// フィールドを追加する
    pub fn field(
        mut self,
        name: impl Into<String>,
        declared_type: impl Into<String>,
        value: RemoteValue,
    ) -> Self {
        self.fields.insert(
            name.into(),
            SimField {
                declared_type: declared_type.into(),
                value,
            },
        );
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

#[derive(Default)]
struct SimState {
    threads: BTreeSet<ThreadId>,
    objects: HashMap<ObjectId, SimObject>,
    next_object: u64,
    locals: HashMap<(ThreadId, usize, usize), SimField>,
    methods: HashMap<MethodId, MethodBehavior>,
    next_handle: u64,
    live_handles: HashSet<HandleId>,
    released_count: usize,
    next_eval: u64,
    open_evals: HashMap<FuncEvalId, ThreadId>,
    opened_options: VecDeque<FuncEvalOptions>,
    closed_evals: usize,
    fail_close: bool,
    calls: VecDeque<RecordedCall>,
    /// 完了しない呼び出しの送信側（破棄すると切断になるため、再開まで保持しておく）
    hung_calls: Vec<Sender<CallResult>>,
    discarded_results: usize,
    resume_count: usize,
}

fn push_bounded<T>(history: &mut VecDeque<T>, item: T) {
    if history.len() == HISTORY_LIMIT {
        history.pop_front();
    }
    history.push_back(item);
}

fn lock_state(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimState {
    fn new_handle(&mut self, value: RemoteValue, type_name: String) -> RemoteHandle {
        self.next_handle += 1;
        let id = HandleId(self.next_handle);
        self.live_handles.insert(id);
        RemoteHandle {
            id,
            value,
            type_name,
        }
    }

    fn runtime_type(&self, value: &RemoteValue, declared_type: &str) -> String {
        if let Some(name) = value.primitive_type_name() {
            return name.to_string();
        }
        value
            .as_object()
            .and_then(|id| self.objects.get(&id))
            .map(|obj| obj.type_name.clone())
            .unwrap_or_else(|| declared_type.to_string())
    }

    fn load_field(&mut self, value: RemoteValue, declared_type: String) -> Loaded {
        if value.is_null() {
            return Loaded::Null { declared_type };
        }
        let type_name = self.runtime_type(&value, &declared_type);
        Loaded::Value(self.new_handle(value, type_name))
    }

    fn add_object(&mut self, object: SimObject) -> ObjectId {
        self.next_object += 1;
        let id = ObjectId(self.next_object);
        self.objects.insert(id, object);
        id
    }

    fn complete(&mut self, behavior: &MethodBehavior, this: Option<ObjectId>) -> CallReturn {
        match behavior {
            MethodBehavior::Return(value) => {
                CallReturn::Returned(self.load_field(value.clone(), "System.Object".into()))
            }
            MethodBehavior::ReturnNull { return_type } => CallReturn::Returned(Loaded::Null {
                declared_type: return_type.clone(),
            }),
            MethodBehavior::ToString => {
                let text = this
                    .and_then(|id| self.objects.get(&id))
                    .map(|obj| obj.type_name.clone())
                    .unwrap_or_default();
                let handle = self.new_handle(RemoteValue::String(text), STRING_TYPE.into());
                CallReturn::Returned(Loaded::Value(handle))
            }
            MethodBehavior::Throw { exception_type } => {
                let exception = SimObject::new(exception_type.clone()).field(
                    "Message",
                    STRING_TYPE,
                    RemoteValue::String(format!("{} was thrown", exception_type)),
                );
                let id = self.add_object(exception);
                CallReturn::Threw(self.new_handle(RemoteValue::Object(id), exception_type.clone()))
            }
            MethodBehavior::Delay(_, inner) => self.complete(inner, this),
            // 呼び出し元で処理済み
            MethodBehavior::Hang => CallReturn::Returned(Loaded::Null {
                declared_type: "System.Object".into(),
            }),
        }
    }

    /// 受け取り手のいない遅れた結果を破棄し、そのハンドルを回収する
    fn discard_late_result(&mut self, late: CallReturn) {
        self.discarded_results += 1;
        let handle = match late {
            CallReturn::Returned(Loaded::Value(handle)) | CallReturn::Threw(handle) => handle,
            CallReturn::Returned(Loaded::Null { .. }) => return,
        };
        self.live_handles.remove(&handle.id);
        debug!("discarded late result handle #{}", handle.id.0);
    }
}

/// メモリ上で動作するデバッグ対象
#[derive(Default)]
pub struct SimDebuggee {
    state: Arc<Mutex<SimState>>,
}

impl SimDebuggee {
    /// 空のデバッグ対象を作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// 小さなサンプルプログラムの停止状態を作成する
    ///
    /// スレッド1のフレーム0に、`Sample.Customer` オブジェクト、整数、nullの文字列を持ちます。
    pub fn with_sample_program() -> Self {
        let sim = Self::new();
        let main = ThreadId(1);
        sim.add_thread(main);

        let orders = sim.add_object(SimObject::array(
            "System.Int32",
            vec![RemoteValue::I32(10), RemoteValue::I32(20), RemoteValue::I32(30)],
        ));
        let customer = sim.add_object(
            SimObject::new("Sample.Customer")
                .field("Name", STRING_TYPE, RemoteValue::String("Ada".into()))
                .field("Orders", "System.Int32[]", RemoteValue::Object(orders))
                .field("Manager", "Sample.Customer", RemoteValue::Null),
        );

        sim.set_local(main, 0, 0, "Sample.Customer", RemoteValue::Object(customer));
        sim.set_local(main, 0, 1, "System.Int32", RemoteValue::I32(42));
        sim.set_local(main, 0, 2, STRING_TYPE, RemoteValue::Null);

        sim.define_method(MethodId::new("System.Object", "ToString"), MethodBehavior::ToString);
        sim.define_method(
            MethodId::new("Sample.Customer", "GetOrderCount"),
            MethodBehavior::Return(RemoteValue::I32(3)),
        );
        sim.define_method(
            MethodId::new("Sample.Customer", "GetManager"),
            MethodBehavior::ReturnNull {
                return_type: "Sample.Customer".into(),
            },
        );
        sim.define_method(
            MethodId::new("Sample.Customer", "Validate"),
            MethodBehavior::Throw {
                exception_type: "System.InvalidOperationException".into(),
            },
        );
        sim.define_method(
            MethodId::new("Sample.Customer", "Refresh"),
            MethodBehavior::Delay(
                Duration::from_millis(200),
                Box::new(MethodBehavior::Return(RemoteValue::Bool(true))),
            ),
        );
        sim.define_method(MethodId::new("Sample.Customer", "WaitForever"), MethodBehavior::Hang);
        sim
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        lock_state(&self.state)
    }

    pub fn add_thread(&self, tid: ThreadId) {
        self.state().threads.insert(tid);
    }

    /// オブジェクトを追加してIDを返す
    pub fn add_object(&self, object: SimObject) -> ObjectId {
        self.state().add_object(object)
    }

    /// ローカル変数を設定する
    pub fn set_local(
        &self,
        thread: ThreadId,
        frame: usize,
        index: usize,
        declared_type: impl Into<String>,
        value: RemoteValue,
    ) {
        self.state().locals.insert(
            (thread, frame, index),
            SimField {
                declared_type: declared_type.into(),
                value,
            },
        );
    }

    /// メソッドの振る舞いを定義する
    pub fn define_method(&self, method: MethodId, behavior: MethodBehavior) {
        self.state().methods.insert(method, behavior);
    }

    /// 関数評価リソースの解放を失敗させる
    pub fn set_fail_close(&self, fail: bool) {
        self.state().fail_close = fail;
    }

    /// オブジェクトの型名を取得する
    pub fn object_type(&self, id: ObjectId) -> Option<String> {
        self.state().objects.get(&id).map(|obj| obj.type_name.clone())
    }

    /// 解放に成功したハンドルの数（同じハンドルの二度目の解放は失敗する）
    pub fn released_handle_count(&self) -> usize {
        self.state().released_count
    }

    /// まだ解放されていないハンドルの数
    pub fn live_handle_count(&self) -> usize {
        self.state().live_handles.len()
    }

    /// 最近開かれた関数評価リソースのオプション（古い順）
    pub fn opened_func_evals(&self) -> Vec<FuncEvalOptions> {
        self.state().opened_options.iter().cloned().collect()
    }

    /// 最近発行されたメソッド呼び出し（古い順）
    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.state().calls.iter().cloned().collect()
    }

    /// 受け取り手がおらず破棄された遅延呼び出しの結果の数
    pub fn discarded_result_count(&self) -> usize {
        self.state().discarded_results
    }

    /// 現在開いている関数評価リソースの数
    pub fn open_func_eval_count(&self) -> usize {
        self.state().open_evals.len()
    }

    /// 解放された関数評価リソースの数
    pub fn closed_func_eval_count(&self) -> usize {
        self.state().closed_evals
    }

    pub fn resume_count(&self) -> usize {
        self.state().resume_count
    }
}

impl Transport for SimDebuggee {
    fn open_func_eval(&self, thread: ThreadId, options: &FuncEvalOptions) -> Result<FuncEvalId> {
        let mut state = self.state();
        if !state.threads.contains(&thread) {
            return Err(TransportError::NoSuchThread(thread));
        }
        if let Some((busy, _)) = state.open_evals.iter().find(|(_, t)| **t == thread) {
            return Err(TransportError::FuncEvalBusy(busy.0));
        }

        state.next_eval += 1;
        let id = FuncEvalId(state.next_eval);
        state.open_evals.insert(id, thread);
        push_bounded(&mut state.opened_options, options.clone());
        debug!(
            "open func-eval #{} on {} (timeout={:?}, suspend_other_threads={})",
            id.0, thread, options.timeout, options.suspend_other_threads
        );
        Ok(id)
    }

    fn call_method(
        &self,
        eval: FuncEvalId,
        method: &MethodId,
        this: Option<ObjectId>,
        args: &[RemoteValue],
    ) -> Result<Receiver<CallResult>> {
        let mut state = self.state();
        if !state.open_evals.contains_key(&eval) {
            return Err(TransportError::UnknownFuncEval(eval.0));
        }
        let behavior = state
            .methods
            .get(method)
            .cloned()
            .ok_or_else(|| TransportError::NoSuchMethod(method.clone()))?;
        if let Some(id) = this {
            if !state.objects.contains_key(&id) {
                return Err(TransportError::NoSuchObject(id));
            }
        }

        debug!("func-eval #{}: call {} on {:?} with {:?}", eval.0, method, this, args);
        push_bounded(
            &mut state.calls,
            RecordedCall {
                method: method.clone(),
                this,
                args: args.to_vec(),
            },
        );

        let (tx, rx) = mpsc::channel();
        match &behavior {
            MethodBehavior::Hang => state.hung_calls.push(tx),
            MethodBehavior::Delay(delay, inner) => {
                let (delay, inner) = (*delay, inner.as_ref().clone());
                let shared = Arc::clone(&self.state);
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    // 結果のハンドルは完了時点で作る。受信側がタイムアウトで破棄済みなら回収する
                    let mut state = lock_state(&shared);
                    let result = state.complete(&inner, this);
                    if let Err(SendError(Ok(late))) = tx.send(Ok(result)) {
                        state.discard_late_result(late);
                    }
                });
            }
            _ => {
                let result = state.complete(&behavior, this);
                let _ = tx.send(Ok(result));
            }
        }
        Ok(rx)
    }

    fn close_func_eval(&self, eval: FuncEvalId) -> Result<()> {
        let mut state = self.state();
        if state.fail_close {
            return Err(TransportError::Disconnected);
        }
        state
            .open_evals
            .remove(&eval)
            .ok_or(TransportError::UnknownFuncEval(eval.0))?;
        state.closed_evals += 1;
        debug!("close func-eval #{}", eval.0);
        Ok(())
    }

    fn load(&self, location: &ValueLocation) -> Result<Loaded> {
        let mut state = self.state();
        let invalid = || TransportError::InvalidLocation(location.clone());

        let (value, declared_type) = match location {
            ValueLocation::Local { thread, frame, index } => {
                if !state.threads.contains(thread) {
                    return Err(TransportError::NoSuchThread(*thread));
                }
                let local = state.locals.get(&(*thread, *frame, *index)).ok_or_else(invalid)?;
                (local.value.clone(), local.declared_type.clone())
            }
            ValueLocation::Field { object, field } => {
                let obj = state
                    .objects
                    .get(object)
                    .ok_or(TransportError::NoSuchObject(*object))?;
                let field = obj.fields.get(field).ok_or_else(invalid)?;
                (field.value.clone(), field.declared_type.clone())
            }
            ValueLocation::ArrayElement { array, index } => {
                let obj = state
                    .objects
                    .get(array)
                    .ok_or(TransportError::NoSuchObject(*array))?;
                let element_type = obj.element_type.clone().ok_or_else(invalid)?;
                let value = obj.elements.get(*index).cloned().ok_or_else(invalid)?;
                (value, element_type)
            }
            ValueLocation::EvalResult { .. } => return Err(invalid()),
        };

        Ok(state.load_field(value, declared_type))
    }

    fn release(&self, handle: HandleId) -> Result<()> {
        let mut state = self.state();
        if !state.live_handles.remove(&handle) {
            return Err(TransportError::UnknownHandle(handle.0));
        }
        state.released_count += 1;
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        let mut state = self.state();
        state.resume_count += 1;
        // 完了しなかった呼び出しは再開とともに放棄される
        state.hung_calls.clear();
        debug!("resume debuggee ({} time(s))", state.resume_count);
        Ok(())
    }
}
