//! Input handling

mod keyboard;
