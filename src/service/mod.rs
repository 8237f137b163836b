//! Blueprint actions and the relation maintenance behind them.

mod blueprint;
mod integrity;
mod unit_of_work;
mod validation;

pub use blueprint::Blueprint;
pub use integrity::{exists_in_target, Integrity};
pub use unit_of_work::{lock_key, RelationGuard, RelationLocks, UnitOfWork};
pub use validation::AttributeValidator;
