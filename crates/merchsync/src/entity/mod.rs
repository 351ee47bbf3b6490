//! SeaORM entity definitions for the source store schema.

pub mod prelude;
pub mod product;
pub mod sync_status;
