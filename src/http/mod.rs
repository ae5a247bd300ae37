//! Response envelopes, extractors, and the [`RouteModule`] trait.

pub mod query;
pub mod response;
pub mod routes;
pub mod validated;

pub use query::PaginationQuery;
pub use response::{ApiResponse, CreatedResponse, JsonResponse, PaginatedData, PaginationMeta};
pub use routes::RouteModule;
pub use validated::ValidatedJson;
