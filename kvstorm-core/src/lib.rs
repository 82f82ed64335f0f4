pub mod driver;
pub mod store;

pub use driver::{DriverConfig, DriverContext, drain, populate, run_workload};
pub use store::memory::MemoryStore;
pub use store::redis::{RedisConfig, RedisStore};
pub use store::{BatchOutcome, CallStat, Store, StoreCall, StoreError};
