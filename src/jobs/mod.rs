pub mod record;
pub mod scheduler;
pub mod sink;
