pub mod config;
pub mod err;
pub mod http;
pub mod models;
pub mod scalar;
pub mod schema;
pub mod store;

pub use config::Config;
pub use err::Error;
pub use schema::{build_schema, StudentSchema};
