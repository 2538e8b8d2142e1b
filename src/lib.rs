pub mod assembler;
pub mod audio;
pub mod completion;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod llm;
pub mod model;
pub mod outline;
pub mod pacing;
pub mod server;
pub mod source;
pub mod speech;
pub mod store;
pub mod transcript;
