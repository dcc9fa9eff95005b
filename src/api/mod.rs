//! Backend API: fetch wrapper, normalization, cached reads and mutations.

pub mod api_types;
pub mod auth;
pub mod cache;
pub mod cached_client;
pub mod client;
pub mod error;
pub mod mutation;
pub mod types;

pub use auth::{AuthApi, Registration};
pub use cached_client::MovieClient;
pub use client::{
  Access, HttpClient, HttpRequest, HttpResponse, Method, ReqwestTransport, RetryPolicy, Transport,
};
pub use error::FetchError;
pub use mutation::{Mutation, MutationBroadcaster, Resource};
pub use types::*;
