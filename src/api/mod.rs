//! API Module
//!
//! HTTP handlers, routing and the cookie route guard.
//!
//! # Endpoints
//! - `GET /health` - Health check
//! - `POST /documents/:collection` - Create a document
//! - `GET|PATCH|DELETE /documents/:collection/:id` - Read, update or delete a document
//! - `POST /query/:collection` - Filtered, paginated query
//! - `POST /batch` - Atomic batch of writes
//! - `GET /cache/stats`, `DELETE /cache`, `DELETE /cache/:collection` - Cache admin
//! - `PUT /selection/project`, `PUT /selection/requirement`, `GET /selection`
//! - `POST /analysis`, `GET|DELETE /analysis/:id` - AI pipeline runs
//! - `GET|DELETE /errors/last` - Latest recorded failure

pub mod guard;
pub mod handlers;
pub mod routes;

pub use guard::{route_guard, Access, RouteTable};
pub use handlers::*;
pub use routes::{create_router, create_router_with_table};
