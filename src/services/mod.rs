pub mod gateway;
pub mod grading_service;
pub mod memory_gateway;
pub mod supabase_gateway;

pub use gateway::{GatewayResult, PersistenceGateway};
pub use memory_gateway::{GatewayCall, GatewayOp, InMemoryGateway};
pub use supabase_gateway::SupabaseGateway;
