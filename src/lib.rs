pub mod args;
pub mod audio;
pub mod error;
pub mod images;
pub mod pipeline;
pub mod render;
pub mod session;
pub mod speaker;
pub mod subtitle;
pub mod thread;
pub mod timeline;
pub mod tts;
pub mod utils;
