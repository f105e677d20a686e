pub mod accounts;
pub mod activity;
pub mod config;
pub mod consultation;
pub mod db;
pub mod error;
pub mod imaging;
pub mod inference;
pub mod ipc;
pub mod ledger;
pub mod marketplace;
pub mod models;
pub mod prompts;
pub mod sections;
pub mod store;

pub use accounts::NewAccount;
pub use activity::{Activity, ActivityFeed, ActivityKind, DashboardStats};
pub use config::MedsyncConfig;
pub use consultation::{ConsultationError, ConsultationMode, ConsultationState};
pub use error::MedsyncError;
pub use inference::{
    Advice, AdviceClient, ChatMessage, ChatRequest, GroqClient, InferenceBackend, InferenceConfig,
    InferenceError,
};
pub use ledger::SessionLedger;
pub use marketplace::{Cart, CartError, Currency, DeliveryDetails};
pub use models::{AgentType, Role, Session, User, UserContext};
pub use prompts::{build_prompt, Feature, ModelParams, Prompt, PromptInput};
pub use sections::{parse_sections, ParsedSections, SectionKey};
pub use store::{LedgerStore, MemoryStore, PgStore, ProfileStore};
