pub mod edge;
pub mod node;
pub mod registry;
pub mod runners;
pub mod serializer;
pub mod validator;
mod workflow;

pub use workflow::Workflow;
