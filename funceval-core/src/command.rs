//! REPLコマンド

use crate::parse::{parse_argument, parse_object_id};
use crate::ValueId;
use funceval_target::{MethodId, ObjectId, RemoteValue, StopReason, ThreadId, ValueLocation};

/// 例外型名が省略されたときに使う型名
const DEFAULT_EXCEPTION_TYPE: &str = "System.Exception";

/// REPLコマンド
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// デバッグ対象が停止したことを通知
    Pause(StopReason),
    /// 実行継続
    Continue,
    /// 関数評価が可能か確認
    Check,
    /// 対象スレッドを切り替え
    Thread(ThreadId),
    /// メソッド呼び出し
    Invoke {
        this: Option<ObjectId>,
        method: MethodId,
        args: Vec<RemoteValue>,
    },
    /// 現在のスレッドのローカル変数を読み込む（スレッドは実行時に補う）
    LoadLocal { frame: usize, index: usize },
    /// フィールドまたは配列要素を読み込む
    Load(ValueLocation),
    /// 値を表示
    Show(ValueId),
    /// 追跡中の値の一覧
    Values,
    /// 診断情報の表示
    Stats,
    /// ヘルプ表示
    Help,
    /// 終了
    Quit,
}

impl Command {
    /// コマンド文字列をパースする
    pub fn parse(input: &str) -> Option<Self> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            return None;
        }

        match parts[0] {
            "pause" | "p" => parse_stop_reason(&parts[1..]).map(Command::Pause),
            "continue" | "c" => Some(Command::Continue),
            "check" => Some(Command::Check),
            "thread" | "t" => {
                let tid = parts.get(1)?.parse().ok()?;
                Some(Command::Thread(ThreadId(tid)))
            }
            "invoke" | "call" | "i" => {
                if parts.len() < 3 {
                    return None;
                }
                let this = match parts[1] {
                    "-" | "static" => None,
                    obj => Some(parse_object_id(obj).ok()?),
                };
                let method = MethodId::parse(parts[2])?;
                let args = parts[3..]
                    .iter()
                    .map(|a| parse_argument(a))
                    .collect::<anyhow::Result<Vec<_>>>()
                    .ok()?;
                Some(Command::Invoke { this, method, args })
            }
            "load" | "l" => parse_load(&parts[1..]),
            "show" => {
                let id: &str = parts.get(1)?;
                let id = id.strip_prefix('$').unwrap_or(id).parse().ok()?;
                Some(Command::Show(ValueId(id)))
            }
            "values" | "v" => Some(Command::Values),
            "stats" => Some(Command::Stats),
            "help" | "h" | "?" => Some(Command::Help),
            "quit" | "q" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}

fn parse_stop_reason(args: &[&str]) -> Option<StopReason> {
    let exception_type = || {
        args.get(1)
            .map(|s| s.to_string())
            .unwrap_or_else(|| DEFAULT_EXCEPTION_TYPE.to_string())
    };

    match args.first().copied() {
        None | Some("break") => Some(StopReason::Break),
        Some("bp") | Some("breakpoint") => Some(StopReason::Breakpoint),
        Some("step") => Some(StopReason::Step),
        Some("exception") => Some(StopReason::Exception {
            type_name: exception_type(),
            unhandled: false,
        }),
        Some("unhandled") => Some(StopReason::Exception {
            type_name: exception_type(),
            unhandled: true,
        }),
        Some(_) => None,
    }
}

fn parse_load(args: &[&str]) -> Option<Command> {
    match args {
        ["local", frame, index] => Some(Command::LoadLocal {
            frame: frame.parse().ok()?,
            index: index.parse().ok()?,
        }),
        ["field", object, field] => Some(Command::Load(ValueLocation::Field {
            object: parse_object_id(object).ok()?,
            field: field.to_string(),
        })),
        ["elem", array, index] => Some(Command::Load(ValueLocation::ArrayElement {
            array: parse_object_id(array).ok()?,
            index: index.parse().ok()?,
        })),
        _ => None,
    }
}
