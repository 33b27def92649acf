//! 核心编排层：错误与恢复、会话快照、会话监管、单会话编排、批量调度、引擎构建

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod session_supervisor;
pub mod state;
pub mod task_scheduler;

pub use builder::{create_llm_from_config, Engine, EngineBuilder};
pub use error::{AssessError, RecoveryAction};
pub use orchestrator::{SessionOrchestrator, SessionOutcome};
pub use recovery::RecoveryEngine;
pub use session_supervisor::SessionSupervisor;
pub use state::{SessionPhase, SessionSnapshot};
pub use task_scheduler::{AssessmentTarget, BatchPlan, EvaluationScheduler, SessionProgress};
