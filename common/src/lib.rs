pub mod api;
pub mod credentials;
pub mod error;
pub mod history;
pub mod job;
pub mod request;
pub mod store;

pub use api::{StatusOutput, StatusPayload, SubmitResponse};
pub use credentials::{CredentialError, CredentialStore};
pub use error::{ApiError, InputError, StoreError};
pub use history::HistoryStore;
pub use job::{JobId, JobRecord, JobStatus, JobUpdate};
pub use request::{AspectRatio, FastMode, GenerationInput, GenerationRequest, LoraPreset,
                  Model, Resolution, LORA_PRESETS};
pub use store::{MemoryStore, PersistentStore};

pub const DEFAULT_API_BASE_URL: &str =
    "https://prod.api.market/api/v1/magicapi/wan-text-to-image/text-to-video";
pub const API_KEY_HEADER: &str = "x-magicapi-key";

// Keys inside the persistent store
pub const HISTORY_KEY: &str = "video-generation-history";
pub const CREDENTIAL_KEY: &str = "api-key";

pub const DEFAULT_DB_PATH: &str = "vidgen.db";
pub const DEFAULT_CONFIG_PATH: &str = "vidgen.yaml";

/// Billing rate of the generation API, in dollars per second of execution.
pub const COST_PER_SECOND: f64 = 0.001;
