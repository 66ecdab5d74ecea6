pub mod routes;

pub use routes::{create_router, AppState, USER_ID_HEADER};
