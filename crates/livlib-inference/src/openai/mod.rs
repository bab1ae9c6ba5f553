//! OpenAI-compatible provider.
//!
//! Works against OpenAI itself and any endpoint speaking the same
//! `/embeddings` and `/chat/completions` API (vLLM, LM Studio, LocalAI).
//!
//! # Configuration
//!
//! | Variable | Default |
//! |----------|---------|
//! | `OPENAI_BASE_URL` | `https://api.openai.com/v1` |
//! | `OPENAI_API_KEY` | none |
//! | `OPENAI_EMBED_MODEL` | `text-embedding-3-small` |
//! | `OPENAI_GEN_MODEL` | `gpt-4o-mini` |
//! | `OPENAI_EMBED_DIM` | `1536` |
//! | `OPENAI_TIMEOUT` | `30` (seconds) |

mod backend;
pub mod error;
pub mod types;

pub use backend::{OpenAIBackend, OpenAIConfig, DEFAULT_OPENAI_URL};
