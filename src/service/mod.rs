//! CRUD operations, body validation and CSV export over a store session.

mod crud;
mod export;
mod validation;
pub use crud::CrudService;
pub use export::{export_csv, export_filename};
pub use validation::RequestValidator;
