mod queue;
mod shutdown;

pub use queue::BroadcastQueue;
pub use shutdown::Shutdown;
