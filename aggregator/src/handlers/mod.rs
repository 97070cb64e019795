mod app;
mod events;

pub use app::{add_routes, index, AppState};
