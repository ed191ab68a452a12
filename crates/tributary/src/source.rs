//! External data sources.
//!
//! A source is reached through a [`SourceClient`], which a
//! [`CredentialProvider`] builds from a connection's stored credentials.
//! The bundled [`JsonApiClient`] talks to paginated JSON APIs through the
//! [`HttpTransport`](crate::http::HttpTransport) boundary.

mod credentials;
mod errors;
mod json_client;
mod rate_limit;
mod registry;
mod types;

pub use credentials::{
    ApiSession, BearerTokenProvider, BearerTokenSettings, CredentialProvider, Credentials,
};
pub use errors::{Result, SourceError, short_error_message};
pub use json_client::{JsonApiClient, JsonClientOptions};
pub use rate_limit::{ApiRateLimiter, RateLimitedClient, rate_limits};
pub use registry::{SourceDefinition, SourceRegistry};
pub use types::{PageRequest, SourceClient, SourcePage};
