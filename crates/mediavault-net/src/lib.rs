#![forbid(unsafe_code)]

//! HTTP acquisition: client, session lifecycle, classified retry.
//!
//! The [`RetryingFetcher`] is the single entry point callers use. It
//! owns a [`SessionProvider`] so a stale session (anti-bot challenge
//! state, dead connection pool) can be shed and rebuilt mid-retry, and
//! applies a failure-class-specific policy: transient network and
//! server errors back off exponentially, a 403 recreates the session
//! first, any other 4xx or an undecodable payload fails immediately.

mod client;
mod error;
mod fetcher;
mod session;
mod traits;
mod types;

pub use crate::{
    client::HttpClient,
    error::{FetchError, FetchResult},
    fetcher::{BatchReport, PageFailure, RetryingFetcher},
    session::{ReqwestSessionFactory, SessionFactory, SessionProvider},
    traits::{ByteStream, Net, Payload},
    types::{Headers, RetryPolicy},
};
