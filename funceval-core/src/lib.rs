//! funceval 関数評価エンジン
//!
//! このクレートは、停止中のデバッグ対象にメソッド呼び出しを注入して実行させる
//! リモート関数評価の中核を提供します。
//! 前提条件のチェック、単一実行のセッション、タイムアウト、
//! 停止中にだけ有効な値ハンドルのライフサイクル管理を統合します。

pub mod command;
pub mod config;
pub mod control;
pub mod engine;
pub mod errors;
pub mod gate;
pub mod parse;
pub mod pause_cycle;
pub mod session;
pub mod values;

pub use command::Command;
pub use config::{EvalConfig, DEFAULT_FUNC_EVAL_TIMEOUT};
pub use control::ControlThread;
pub use engine::{CallOutput, EvalEngine, Invocation};
pub use errors::{Error, Refusal};
pub use gate::check_func_eval;
pub use pause_cycle::{PauseCycle, PauseCycleId};
pub use session::{Completion, EvalStats, SessionSlot, SlotGuard};
pub use values::{DebugValue, ValueId, ValueTracker};

// 他のクレートから使用するために再エクスポート
pub use funceval_target::{
    MethodId, ObjectId, RemoteValue, StopReason, ThreadId, Transport, ValueLocation,
};

/// 関数評価の結果型
pub type Result<T> = std::result::Result<T, Error>;
