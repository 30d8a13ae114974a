//! funceval ターゲット（デバッグ対象）側の抽象
//!
//! このクレートは、デバッグ対象プロセスと通信するための語彙とトランスポートの抽象を提供します。
//! スレッド、オブジェクト、リモート値、メソッド、値の位置、停止理由、
//! および関数評価リソースを扱う `Transport` トレイトを定義します。
//! テストやCLIのために、メモリ上で動作する `SimDebuggee` も提供します。

pub mod thread;
pub mod value;
pub mod method;
pub mod location;
pub mod process;
pub mod transport;
pub mod sim;

pub use thread::ThreadId;
pub use value::{HandleId, ObjectId, RemoteHandle, RemoteValue};
pub use method::MethodId;
pub use location::{Loaded, ValueLocation};
pub use process::StopReason;
pub use transport::{
    CallResult, CallReturn, CancelToken, FuncEvalId, FuncEvalOptions, Transport, TransportError,
};
pub use sim::{MethodBehavior, RecordedCall, SimDebuggee, SimObject};

/// ターゲット制御の結果型
pub type Result<T> = std::result::Result<T, TransportError>;
