pub mod analysis;
pub mod config;
pub mod error;
pub mod gemini;
pub mod server;

pub use analysis::{build_prompt, extract_links, LINK_MARKER};
pub use config::Config;
pub use error::AppError;
pub use gemini::{GeminiClient, GenerationBackend, GenerationError};
pub use server::{create_router, AppState, SharedState};
