//! Watch-history sources reached over HTTP.

mod common;
mod plex;

pub(crate) use common::resolve_token;
pub use plex::PlexClient;
