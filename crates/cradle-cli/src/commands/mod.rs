pub mod common;
pub mod discard;
pub mod enqueue;
pub mod list;
pub mod purge;
pub mod record;
pub mod status;
pub mod sync;
pub mod watch;
