//! # docsmith
//!
//! A streaming documentation generation backend for locally hosted language
//! models.
//!
//! docsmith accepts a block of text or code, optionally grounds it with
//! reference material fetched from an external knowledge source, builds one
//! of several fixed prompt templates, relays a streaming generation request
//! to a local inference server, and forwards incremental tokens to the HTTP
//! client as they arrive. Finished text can be exported as a PDF, and a
//! minimal SQLite-backed user store provides registration/login tokens.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────┐   ┌───────────────┐   ┌───────────────┐   ┌───────────┐
//! │ client │──▶│ prompt select │──▶│ inference     │──▶│ streamed  │
//! │  POST  │   │ probe+fetch / │   │ relay (NDJSON │   │ markdown  │
//! │        │   │ code detect   │   │ + heartbeat)  │   │ response  │
//! └────────┘   └───────────────┘   └───────────────┘   └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing with env overrides |
//! | [`models`] | Core data types |
//! | [`probe`] | Outbound connectivity probe |
//! | [`grounding`] | Factual context fetcher (search-then-fetch) |
//! | [`prompt`] | Prompt templates and selection policies |
//! | [`relay`] | Streaming inference relay |
//! | [`export`] | PDF document export |
//! | [`auth`] | User store and session tokens |
//! | [`server`] | HTTP API server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod auth;
pub mod config;
pub mod db;
pub mod export;
pub mod grounding;
pub mod migrate;
pub mod models;
pub mod probe;
pub mod prompt;
pub mod relay;
pub mod server;
