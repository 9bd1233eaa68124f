//! # 传输条件代数（TransferState）
//!
//! ## 核心意图（Why）
//! - 把“有没有数据可搬”与“有没有许可可搬”两个问题从搬运逻辑中剥离出来，使同一套
//!   [`Pump`](crate::pump::Pump) 能够驱动读、写两个方向，只需替换所引用的侧；
//! - 条件本身是纯数据，不持有侧对象的引用，求值时通过 [`Readiness`] 视图读取当前状态，
//!   从而避免“泵引用侧、侧回调泵”的循环引用。
//!
//! ## 契约（What）
//! - `NeedsInput(side)`：就绪 ⇔ 该输入侧有缓存数据；完成 ⇔ 该输入侧已耗尽（关闭且无剩余）；
//! - `NeedsDemand(side)`：就绪 ⇔ 该输出侧有需求；完成 ⇔ 该输出侧已关闭；
//! - `All(a, b)`：两者都就绪才就绪，任一完成即完成；`Any(a, b)`：任一就绪即就绪，两者都完成才完成；
//! - `NotInitialized` 永不就绪也永不完成，`Completed` 永不就绪但总是完成；
//! - 求值不得修改任何侧的缓冲或计数。

/// 输入侧标识。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum InputSide {
    /// 由传输层读取驱动的输入侧。
    Transport,
    /// 由内部上游生产者驱动的输入侧。
    Upstream,
}

/// 输出侧标识。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OutputSide {
    /// 由传输层写入承接的输出侧。
    Transport,
    /// 面向内部下游消费者的输出侧。
    Downstream,
}

/// 侧状态的只读视图。
///
/// 实现方必须保证这些查询没有副作用。
pub trait Readiness {
    /// 输入侧是否有可取出的数据。
    fn inputs_available(&self, side: InputSide) -> bool;
    /// 输入侧是否已永久耗尽。
    fn inputs_depleted(&self, side: InputSide) -> bool;
    /// 输出侧是否持有发送许可。
    fn demand_available(&self, side: OutputSide) -> bool;
    /// 输出侧是否已关闭。
    fn output_closed(&self, side: OutputSide) -> bool;
}

/// 可组合的就绪谓词。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TransferState {
    /// 连接尚未进入运行态。
    NotInitialized,
    /// 泵已终止。
    Completed,
    /// 等待输入侧出现数据。
    NeedsInput(InputSide),
    /// 等待输出侧出现需求。
    NeedsDemand(OutputSide),
    /// 合取。
    All(Box<TransferState>, Box<TransferState>),
    /// 析取。
    Any(Box<TransferState>, Box<TransferState>),
}

impl TransferState {
    /// “从 `input` 读、向 `output` 写”的默认联合条件。
    pub fn input_and_demand(input: InputSide, output: OutputSide) -> Self {
        TransferState::NeedsInput(input).and(TransferState::NeedsDemand(output))
    }

    /// 合取。
    pub fn and(self, other: TransferState) -> Self {
        TransferState::All(Box::new(self), Box::new(other))
    }

    /// 析取。
    pub fn or(self, other: TransferState) -> Self {
        TransferState::Any(Box::new(self), Box::new(other))
    }

    /// 当前是否就绪。
    pub fn is_ready<R: Readiness + ?Sized>(&self, sides: &R) -> bool {
        match self {
            TransferState::NotInitialized | TransferState::Completed => false,
            TransferState::NeedsInput(side) => sides.inputs_available(*side),
            TransferState::NeedsDemand(side) => sides.demand_available(*side),
            TransferState::All(a, b) => a.is_ready(sides) && b.is_ready(sides),
            TransferState::Any(a, b) => a.is_ready(sides) || b.is_ready(sides),
        }
    }

    /// 当前是否已完成，完成后不会再次就绪。
    pub fn is_completed<R: Readiness + ?Sized>(&self, sides: &R) -> bool {
        match self {
            TransferState::NotInitialized => false,
            TransferState::Completed => true,
            TransferState::NeedsInput(side) => sides.inputs_depleted(*side),
            TransferState::NeedsDemand(side) => sides.output_closed(*side),
            TransferState::All(a, b) => a.is_completed(sides) || b.is_completed(sides),
            TransferState::Any(a, b) => a.is_completed(sides) && b.is_completed(sides),
        }
    }

    /// 就绪且未完成时才允许执行一次搬运。
    pub fn is_executable<R: Readiness + ?Sized>(&self, sides: &R) -> bool {
        self.is_ready(sides) && !self.is_completed(sides)
    }
}
