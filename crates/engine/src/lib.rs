pub mod draft;
pub mod error;
pub mod materials;
pub mod placer;
pub mod speed;
pub mod splitter;
pub mod story;
pub mod subtitles;
pub mod synthesis;
pub mod timecode;
pub mod timeline;

pub use error::{EngineError, EngineResult};
pub use speed::{GlobalSpeedNormalizer, OuterSpeed, SpeedPlan};
pub use synthesis::{Synthesis, Synthesizer};
pub use timeline::*;
