// src/services/mod.rs
pub mod conversation;
pub mod gemini;
pub mod normalizer;
pub mod prompts;
pub mod stylist_service;
pub mod upload;

pub use gemini::{GeminiClient, GenerativeProvider};
pub use stylist_service::StylistService;
pub use upload::UploadGateway;
