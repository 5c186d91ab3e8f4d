pub mod app;

pub use app::error::AppError;
pub use app::session::Session;
