mod env_overrides;
mod loader;
pub mod schema;

pub use schema::{
    AgentConfig, AgentTrigger, Config, GatewayConfig, GenerationConfig, GuardrailConfig,
    PostgresSettings, PromptConfig, StateStoreBackend, StateStoreConfig,
};
