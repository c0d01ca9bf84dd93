pub mod error;
pub mod global_state;
pub mod pool;
pub mod property;
pub mod record;
pub mod wire;

pub use error::{CoreError, PoolError};
pub use global_state::GlobalState;
pub use pool::{PoolConfig, PoolStats, PooledRecord, RecordPool};
pub use property::{DataProperty, EnumValue, PropertyTag, PropertyValue, Severity};
pub use record::DataRecord;
