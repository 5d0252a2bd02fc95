//! # Agent Relay
//!
//! A small HTTP relay between external message sources and a hosted
//! conversational agent.
//!
//! Callers post a message to `/webhook` (or `/send`); the relay validates it,
//! forwards it once to `{agent}/agents/{name}/run` with a fixed callback URL,
//! and acknowledges whether the forward succeeded. The agent posts its actual
//! answer to the callback on its own.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Message      │──▶│    Relay     │──▶│  Agent API   │
//! │ source       │◀──│ (axum, ack)  │   │  /agents/…   │
//! └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                              │ answer
//!                                              ▼
//!                                       ┌──────────────┐
//!                                       │ Callback URL │
//!                                       └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration, env overrides, validation |
//! | [`models`] | Request, payload and envelope types |
//! | [`agent`] | Outbound agent client and error classification |
//! | [`relay`] | Validate, forward, shape the acknowledgement |
//! | [`server`] | HTTP routes |
//! | [`bootstrap`] | `init` scaffold and `doctor` checks |

pub mod agent;
pub mod bootstrap;
pub mod config;
pub mod models;
pub mod relay;
pub mod server;
