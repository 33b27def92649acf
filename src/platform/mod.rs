//! 学生平台：数据源 / 对话通道 / 预测提交的接口与实现（HTTP / 内存）

pub mod http;
pub mod memory;
pub mod traits;

pub use http::PlatformClient;
pub use memory::InMemoryPlatform;
pub use traits::{
    DryRunSink, Prediction, PredictionSink, StudentChannel, StudentDirectory, StudentInfo,
};
