//! Reusable UI pieces

mod ip_field;
mod spectrum;
mod status_bar;
mod swatches;
mod toast;

pub use ip_field::{IpAction, IpField};
pub use spectrum::{render_spectrum, UNITS_PER_ROW};
pub use status_bar::{render_status_bar, StatusInfo};
pub use swatches::swatch_lines;
pub use toast::{render_toasts, Toast, ToastQueue};
