//! chatfront is the client-side state and networking layer of a chat front end.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`http`] wraps outbound requests for the primary chat backend and the
//!   OneAPI backend, attaching bearer credentials and normalizing failures.
//! - [`api`] defines wire payloads and the thin passthrough calls for every
//!   backend endpoint.
//! - [`core`] owns runtime state: the auth session, the OneAPI
//!   token/model/quota store, topics, configuration and local storage, all
//!   wired together by [`core::context::AppContext`].
//! - [`router`] holds the route table and the navigation guard.
//!
//! The terminal front end lives in [`cli`] and is started from `src/main.rs`.

pub mod api;
pub mod cli;
pub mod core;
pub mod http;
pub mod router;
pub mod utils;
