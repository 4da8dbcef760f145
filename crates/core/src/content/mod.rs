//! Content classification.
//!
//! Decides whether a finished download is a movie, a TV episode, or neither,
//! and extracts the title, year and episode numbers from its name.

mod classify;
mod types;

pub use classify::{
    classify, clean_title, is_video_file, primary_file, video_files, VIDEO_EXTENSIONS,
};
pub use types::{ContentKind, ParsedContent};
