pub mod canon;
pub mod device;
pub mod mock;
pub mod source;
pub mod test_pattern;

pub use device::{ActualFormat, CaptureDevice, CaptureHandle, RawFrame, SourceLayout, StreamKind};
pub use source::CaptureSource;
pub use test_pattern::TestPatternDevice;
