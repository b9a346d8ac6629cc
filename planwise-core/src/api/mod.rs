//! Backend API access
//!
//! ## Layers
//!
//! - [`HttpTransport`] sends one [`ApiRequest`] with an explicit bearer token
//!   and translates every outcome into [`crate::Error`].
//! - [`Gateway`] is the pipeline all entity stores share: it fetches the
//!   current token from the credential store, and on a 401 refreshes once
//!   and reissues the identical request.
//!
//! Every response body is an [`Envelope`]:
//!
//! ```json
//! { "success": true, "data": { ... }, "pagination": { "page": 1, "limit": 20, "total": 42, "totalPages": 3 } }
//! ```

mod envelope;
mod gateway;
mod request;
mod transport;

pub use envelope::{Envelope, Pagination};
pub use gateway::Gateway;
pub use request::{ApiRequest, Method};
pub(crate) use request::entity_path;
pub use transport::HttpTransport;
