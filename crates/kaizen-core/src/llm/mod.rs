//! The single outbound boundary to the generative model (Gemini, via
//! `GOOGLE_API_KEY`). `client.rs` owns the HTTP transport; `judge.rs` and
//! `fixer.rs` are the two call sites (C4's LLM-judged rule and C8).

mod client;
pub mod fixer;
pub mod judge;

pub use client::{LlmClient, LlmClientError};
