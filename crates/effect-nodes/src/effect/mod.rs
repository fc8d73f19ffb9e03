//! Effect nodes
//!
//! Nodes that turn values into device commands on a sink `cmd` port, and
//! send a neutral command when they are disabled.

mod flashlight;
mod screen_color;
mod vibrate;

pub use flashlight::{FlashlightConfig, FlashlightNode};
pub use screen_color::{ScreenColorConfig, ScreenColorNode};
pub use vibrate::{VibrateConfig, VibrateNode};
