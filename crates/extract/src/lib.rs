//! Media discovery and metadata extraction.
//!
//! [`Scanner`] walks a source tree yielding media paths;
//! [`Extractor`] turns those paths into [`MediaRecord`]s carrying
//! capture dates and GPS coordinates read via `exiftool`.

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::exiftool::{ExifTool, Extractor};
pub use crate::record::{MediaRecord, extension_of};
pub use crate::scan::{IMAGE_EXTENSIONS, Scanner, VIDEO_EXTENSIONS, is_media};

mod error;
mod exiftool;
mod record;
mod scan;
