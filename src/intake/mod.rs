pub mod exif;
pub mod preview;
pub mod queue;
pub mod transcode;
pub mod validator;
