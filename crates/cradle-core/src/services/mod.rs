//! Shared services for clients.

mod outbox;
mod owner;

pub use outbox::OutboxService;
pub use owner::OwnerLock;
