//! Langbase pipe client and the collaborators built on it.

mod client;
mod collaborators;
mod types;

pub use client::LangbaseClient;
pub use collaborators::{PipeExpansionOracle, PipeRelationProposer, PipeResearcher};
pub use types::{Message, MessageRole, PipeRequest, PipeResponse, RawResponse, Usage};
