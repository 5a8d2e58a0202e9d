//! Terminal UI

mod app;
mod components;
mod handlers;
mod theme;
mod utils;
mod views;

pub use app::App;
