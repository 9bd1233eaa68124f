use tracing::trace;

use crate::{
    error::FlowError,
    transfer::{Readiness, TransferState},
};

/// 单个方向上的一次搬运步骤。
///
/// 实现方同时提供侧状态的只读视图，泵据此在每一步前后重新求值条件。
pub trait Transfer: Readiness {
    /// 搬运一次，并返回下一步需要满足的条件。
    fn transfer(&mut self) -> Result<TransferState, FlowError>;
}

/// [`Pump::pump`] 的结果。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PumpOutcome {
    /// 条件不满足或已终止，无事可做。
    Idle,
    /// 条件完成，泵终止；每个泵最多报告一次。
    Finished,
    /// 搬运失败，泵终止；与 `Finished` 互斥。
    Failed(FlowError),
}

/// 通用泵：在条件满足时反复执行搬运步骤。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 读、写两个方向共享同一套驱动逻辑，差异全部体现在安装的 [`TransferState`] 与
///   [`Transfer`] 实现上；
/// - 泵没有独立生命周期，状态完全由两侧推导，因此只保存当前条件与“是否已终止”。
///
/// ## 逻辑 (How)
/// - `pump` 先求值条件；可执行时调用 `transfer` 并用其返回值替换条件，直到不可执行；
/// - 条件完成时返回一次 `Finished`，搬运出错时返回一次 `Failed`，此后所有调用都是空操作。
///
/// ## 契约 (What)
/// - `pump` 幂等且可重入：条件不满足时不产生任何副作用；
/// - 所有者负责根据返回值执行“完成”或“失败”行为，泵本身不回调。
#[derive(Debug)]
pub struct Pump {
    name: &'static str,
    transfer_state: TransferState,
    terminated: bool,
}

impl Pump {
    /// 创建处于 `NotInitialized` 的泵。
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            transfer_state: TransferState::NotInitialized,
            terminated: false,
        }
    }

    /// 泵名，用于日志。
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 安装新的条件；泵终止后忽略。
    pub fn set_transfer_state(&mut self, state: TransferState) {
        if !self.terminated {
            self.transfer_state = state;
        }
    }

    /// 当前条件。
    pub fn transfer_state(&self) -> &TransferState {
        &self.transfer_state
    }

    /// 是否已终止。
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// 在不报告结果的前提下终止泵，供连接级 `fail` 使用。
    pub fn terminate(&mut self) {
        self.terminated = true;
        self.transfer_state = TransferState::Completed;
    }

    /// 驱动搬运直到条件不再可执行。
    pub fn pump<T: Transfer + ?Sized>(&mut self, step: &mut T) -> PumpOutcome {
        if self.terminated {
            return PumpOutcome::Idle;
        }
        while self.transfer_state.is_executable(&*step) {
            match step.transfer() {
                Ok(next) => self.transfer_state = next,
                Err(err) => {
                    trace!(pump = self.name, error = %err, "transfer step failed");
                    self.terminate();
                    return PumpOutcome::Failed(err);
                }
            }
        }
        if self.transfer_state.is_completed(&*step) {
            trace!(pump = self.name, "pump finished");
            self.terminate();
            return PumpOutcome::Finished;
        }
        PumpOutcome::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::{InputSide, OutputSide};

    /// 计数型假步骤：`pending` 个单元待搬，`demand` 个许可，`closed` 控制输入耗尽。
    struct Counting {
        pending: usize,
        demand: usize,
        closed: bool,
        moved: usize,
        fail_at: Option<usize>,
    }

    impl Counting {
        fn new(pending: usize, demand: usize) -> Self {
            Self {
                pending,
                demand,
                closed: false,
                moved: 0,
                fail_at: None,
            }
        }
    }

    impl Readiness for Counting {
        fn inputs_available(&self, _side: InputSide) -> bool {
            self.pending > 0
        }
        fn inputs_depleted(&self, _side: InputSide) -> bool {
            self.closed && self.pending == 0
        }
        fn demand_available(&self, _side: OutputSide) -> bool {
            self.demand > 0
        }
        fn output_closed(&self, _side: OutputSide) -> bool {
            false
        }
    }

    impl Transfer for Counting {
        fn transfer(&mut self) -> Result<TransferState, FlowError> {
            if self.fail_at == Some(self.moved) {
                return Err(FlowError::protocol("boom"));
            }
            self.pending -= 1;
            self.demand -= 1;
            self.moved += 1;
            Ok(joint())
        }
    }

    fn joint() -> TransferState {
        TransferState::input_and_demand(InputSide::Transport, OutputSide::Downstream)
    }

    #[test]
    fn not_initialized_pump_is_idle() {
        let mut pump = Pump::new("read");
        let mut step = Counting::new(3, 3);
        assert_eq!(pump.pump(&mut step), PumpOutcome::Idle);
        assert_eq!(step.moved, 0);
    }

    #[test]
    fn moves_while_both_conditions_hold() {
        let mut pump = Pump::new("read");
        pump.set_transfer_state(joint());
        let mut step = Counting::new(5, 2);
        assert_eq!(pump.pump(&mut step), PumpOutcome::Idle);
        assert_eq!(step.moved, 2);
        step.demand = 10;
        assert_eq!(pump.pump(&mut step), PumpOutcome::Idle);
        assert_eq!(step.moved, 5);
    }

    #[test]
    fn finished_is_reported_once() {
        let mut pump = Pump::new("read");
        pump.set_transfer_state(joint());
        let mut step = Counting::new(1, 1);
        step.closed = true;
        assert_eq!(pump.pump(&mut step), PumpOutcome::Finished);
        assert!(pump.is_terminated());
        assert_eq!(pump.pump(&mut step), PumpOutcome::Idle);
        assert_eq!(step.moved, 1);
    }

    #[test]
    fn failure_excludes_finish() {
        let mut pump = Pump::new("write");
        pump.set_transfer_state(joint());
        let mut step = Counting::new(2, 2);
        step.fail_at = Some(1);
        step.closed = true;
        assert!(matches!(pump.pump(&mut step), PumpOutcome::Failed(_)));
        assert_eq!(pump.pump(&mut step), PumpOutcome::Idle);
        assert_eq!(*pump.transfer_state(), TransferState::Completed);
    }

    #[test]
    fn terminated_pump_ignores_new_state() {
        let mut pump = Pump::new("write");
        pump.terminate();
        pump.set_transfer_state(joint());
        assert_eq!(*pump.transfer_state(), TransferState::Completed);
    }
}
