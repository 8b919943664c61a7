//! Background execution: a restartable thread wrapper and the self-pacing
//! loop worker that runs on it.

pub mod looped;
pub mod wrapper;

pub use looped::{
    LoopMode, LoopSettings, LoopStatistics, LoopedThreadWorker, SharedLoopSettings,
    SharedLoopStatistics, StepTime, DEFAULT_INTERVAL,
};
pub use wrapper::{StopToken, ThreadState, ThreadWrapper, Worker};
