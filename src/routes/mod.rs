pub mod docs;
pub mod routes;
