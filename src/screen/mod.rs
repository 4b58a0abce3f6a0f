pub mod render;
pub mod writer;

pub use render::{FrameInput, RegionId};
pub use writer::{CrosstermOut, ScreenWriter, TermOut};
