//! The three hook pipelines: PreToolUse, Stop, and session lifecycle.

mod lifecycle;
mod pre_tool;
mod stop;

pub use lifecycle::LifecyclePipeline;
pub use pre_tool::PreToolPipeline;
pub use stop::StopPipeline;
