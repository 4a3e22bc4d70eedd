mod repository;
pub mod schema;
pub mod upsert;

pub use repository::Repository;
