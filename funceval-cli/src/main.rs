//! funceval CLI - コマンドラインインターフェース
//!
//! シミュレーションされたデバッグ対象に対して、停止・関数評価・再開を試すためのREPL

use anyhow::Result;
use clap::Parser;
use funceval_core::{
    Command, DebugValue, EvalConfig, EvalEngine, Invocation, ThreadId, ValueId, ValueLocation,
};
use funceval_target::SimDebuggee;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// funceval - remote function evaluation playground
#[derive(Parser)]
#[command(name = "funceval")]
#[command(version = "0.1.0")]
#[command(about = "Explore pause / func-eval / continue against a simulated debuggee", long_about = None)]
struct Cli {
    /// Func-eval timeout in milliseconds
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    /// Let other debuggee threads run while a func-eval is in progress
    #[arg(long)]
    no_suspend_other_threads: bool,
}

impl Cli {
    fn eval_config(&self) -> EvalConfig {
        EvalConfig::default()
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_suspend_other_threads(!self.no_suspend_other_threads)
    }
}

/// REPLの状態
struct Repl {
    engine: EvalEngine,
    thread: ThreadId,
    /// 表示用に保持している値（再開後も古い値として参照できる）
    values: BTreeMap<ValueId, DebugValue>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    println!("funceval - remote function evaluation playground");
    println!("Version 0.1.0");
    println!();

    let config = cli.eval_config();
    debug!("func-eval config: {:?}", config);
    let sim = Arc::new(SimDebuggee::with_sample_program());
    let mut session = Repl {
        engine: EvalEngine::new(sim, config),
        thread: ThreadId(1),
        values: BTreeMap::new(),
    };
    println!(
        "Simulated debuggee loaded (timeout: {:?}, suspend other threads: {})",
        session.engine.config().timeout,
        session.engine.config().suspend_other_threads
    );
    println!("The debuggee is running. Use 'pause' to stop it.");
    println!();

    run_repl(&mut session)
}

/// REPLループを実行する
fn run_repl(session: &mut Repl) -> Result<()> {
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline("(funceval) ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                match handle_command(session, line) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        if e.downcast_ref::<funceval_core::Error>().is_some_and(|e| e.is_fatal()) {
                            eprintln!("Lost synchronization with the debuggee, exiting");
                            break;
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}

/// コマンドを処理する。REPLを終了する場合は false を返す
fn handle_command(session: &mut Repl, line: &str) -> Result<bool> {
    let Some(command) = Command::parse(line) else {
        println!("Unknown command: {}", line);
        println!("Type 'help' for available commands.");
        return Ok(true);
    };

    match command {
        Command::Help => print_help(),
        Command::Quit => return Ok(false),
        Command::Pause(reason) => {
            let id = session.engine.on_paused(reason);
            println!("Debuggee paused ({})", id);
        }
        Command::Continue => {
            if !session.engine.is_paused() {
                println!("Debuggee is already running");
            } else {
                let released = session.engine.continue_execution()?;
                println!("Continuing execution... ({} value(s) released)", released);
            }
        }
        Command::Check => match session.engine.check_func_eval() {
            Ok(()) => println!("Func-eval is possible"),
            Err(refusal) => println!("Func-eval not possible: {}", refusal),
        },
        Command::Thread(tid) => {
            session.thread = tid;
            println!("Current thread: {}", tid);
        }
        Command::Invoke { this, method, args } => {
            session.engine.check_func_eval()?;
            match session.engine.invoke(session.thread, this, &method, &args)? {
                Invocation::Returned(value) => {
                    println!("{}", value);
                    remember(session, value);
                }
                Invocation::Threw(exception) => {
                    println!("{} threw {}", method, exception);
                    remember(session, exception);
                }
                Invocation::TimedOut => {
                    println!("Func-eval of {} timed out", method);
                    println!("Func-eval is disabled until the debuggee continues");
                }
            }
        }
        Command::LoadLocal { frame, index } => {
            let location = ValueLocation::Local {
                thread: session.thread,
                frame,
                index,
            };
            load(session, location)?;
        }
        Command::Load(location) => load(session, location)?,
        Command::Show(id) => match session.values.get(&id) {
            Some(value) => println!("{} [{} @ {}]", value, value.location(), value.cycle()),
            None => println!("No value {}", id),
        },
        Command::Values => {
            let tracked = session.engine.value_tracker().snapshot();
            if tracked.is_empty() {
                println!("No tracked values");
            }
            for value in tracked {
                println!("  {} [{}]", value, value.location());
            }
        }
        Command::Stats => {
            let stats = session.engine.stats();
            println!("Evaluating: {}", stats.is_evaluating());
            println!("Method invocations: {}", stats.method_invoke_counter());
            println!(
                "Tracked values: {}",
                session.engine.value_tracker().tracked_count()
            );
            match session.engine.pause_cycle() {
                Some(cycle) => println!(
                    "Paused: {} ({:?}), func-eval timed out: {}",
                    cycle.id(),
                    cycle.stop_reason(),
                    cycle.has_timed_out_marker()
                ),
                None => println!("Running"),
            }
        }
    }

    Ok(true)
}

/// 値を読み込んで表示する
fn load(session: &mut Repl, location: ValueLocation) -> Result<()> {
    let value = session.engine.create_value(location)?;
    println!("{}", value);
    remember(session, value);
    Ok(())
}

fn remember(session: &mut Repl, value: DebugValue) {
    session.values.insert(value.id(), value);
}

fn print_help() {
    println!("Available commands:");
    println!();
    println!("  help                         - Show this help message");
    println!("  quit/exit/q                  - Exit");
    println!();
    println!("Debuggee state:");
    println!("  pause [bp|step|break]        - Notify that the debuggee stopped");
    println!("  pause exception [type]       - Stop on a first-chance exception");
    println!("  pause unhandled [type]       - Stop on an unhandled exception");
    println!("  continue (c)                 - Release values and resume the debuggee");
    println!("  thread <n>                   - Select the thread used for func-eval");
    println!();
    println!("Evaluation:");
    println!("  check                        - Check whether func-eval is possible");
    println!("  invoke <@obj|-> <T.M> [args] - Call a method in the debuggee");
    println!("  load local <frame> <index>   - Load a local variable");
    println!("  load field <@obj> <name>     - Load a field");
    println!("  load elem <@obj> <index>     - Load an array element");
    println!("  show <$id>                   - Show a value created earlier");
    println!("  values                       - List tracked values");
    println!("  stats                        - Show func-eval diagnostics");
    println!();
    println!("Examples:");
    println!("  pause bp");
    println!("  load local 0 0");
    println!("  invoke @2 System.Object.ToString");
    println!("  invoke @2 Sample.Customer.WaitForever");
}
