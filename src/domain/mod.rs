// Domain layer - pipeline data model and stateful bookkeeping
pub mod dedup;
pub mod partial;
pub mod row;
pub mod selector;
pub mod state;
pub mod stream;
pub mod watermark;
