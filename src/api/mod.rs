pub mod account_handlers;
pub mod handlers;
pub mod routes;
pub mod session_extractor;

pub use account_handlers::*;
pub use handlers::*;
pub use routes::*;
pub use session_extractor::CurrentUser;
