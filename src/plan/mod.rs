//! Plan aggregate: model, merge-patch, cascade planning and the write path

pub mod cascade;
pub mod concurrency;
pub mod error;
pub mod manager;
pub mod merge;
pub mod models;
pub mod tree;

pub use concurrency::{ConcurrencyControl, ConditionalRead};
pub use error::PlanError;
pub use manager::PlanManager;
pub use models::{CostShares, LinkedPlanService, LinkedService, ObjectId, Plan, PlanPatch};
