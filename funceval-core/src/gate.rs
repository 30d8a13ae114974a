//! 関数評価の前提条件チェック

use crate::{EvalStats, PauseCycle, Refusal};

/// 関数評価を開始してよいか判定する
///
/// 以下の順に判定し、最初に該当した理由を返します。副作用はありません。
/// 1. 停止中でない
/// 2. 未処理例外で停止している
/// 3. この停止サイクルで関数評価がタイムアウトした
/// 4. 別の関数評価が実行中
pub fn check_func_eval(cycle: Option<&PauseCycle>, stats: &EvalStats) -> Result<(), Refusal> {
    let Some(cycle) = cycle else {
        return Err(Refusal::NotPaused);
    };
    if cycle.is_unhandled_exception() {
        return Err(Refusal::UnhandledExceptionActive);
    }
    if cycle.has_timed_out_marker() {
        return Err(Refusal::EvaluationDisabledAfterTimeout);
    }
    if stats.is_evaluating() {
        return Err(Refusal::EvaluationAlreadyInFlight);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PauseCycleId, SessionSlot};
    use funceval_target::StopReason;

    fn unhandled() -> StopReason {
        StopReason::Exception {
            type_name: "System.NullReferenceException".into(),
            unhandled: true,
        }
    }

    #[test]
    fn test_not_paused() {
        let slot = SessionSlot::new();
        assert_eq!(check_func_eval(None, slot.stats()), Err(Refusal::NotPaused));
    }

    #[test]
    fn test_ok_when_paused() {
        let slot = SessionSlot::new();
        let cycle = PauseCycle::new(PauseCycleId(1), StopReason::Breakpoint);
        assert_eq!(check_func_eval(Some(&cycle), slot.stats()), Ok(()));
        // 何度呼んでも同じ結果
        assert_eq!(check_func_eval(Some(&cycle), slot.stats()), Ok(()));
    }

    #[test]
    fn test_unhandled_exception_wins_over_timeout_and_in_flight() {
        let slot = SessionSlot::new();
        let _guard = slot.try_open();
        let mut cycle = PauseCycle::new(PauseCycleId(1), unhandled());
        cycle.set_timed_out_marker();
        assert_eq!(
            check_func_eval(Some(&cycle), slot.stats()),
            Err(Refusal::UnhandledExceptionActive)
        );
    }

    #[test]
    fn test_timeout_wins_over_in_flight() {
        let slot = SessionSlot::new();
        let _guard = slot.try_open();
        let mut cycle = PauseCycle::new(PauseCycleId(1), StopReason::Step);
        cycle.set_timed_out_marker();
        assert_eq!(
            check_func_eval(Some(&cycle), slot.stats()),
            Err(Refusal::EvaluationDisabledAfterTimeout)
        );
    }

    #[test]
    fn test_in_flight() {
        let slot = SessionSlot::new();
        let cycle = PauseCycle::new(PauseCycleId(1), StopReason::Break);
        let guard = slot.try_open();
        assert_eq!(
            check_func_eval(Some(&cycle), slot.stats()),
            Err(Refusal::EvaluationAlreadyInFlight)
        );
        drop(guard);
        assert_eq!(check_func_eval(Some(&cycle), slot.stats()), Ok(()));
    }
}
