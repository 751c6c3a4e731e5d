//! Filename templating for organized media.
//!
//! Converts a capture date and original filename into the destination file
//! name using a user-configured [upon] template. The template syntax follows
//! upon's Mustache-like conventions (`{{ variable }}`).
//!
//! # Template Variables
//!
//! | Variable | Type     | Description                                        |
//! |----------|----------|----------------------------------------------------|
//! | `date`   | `String` | Capture date as `YYYY-MM-DD`, or `Unknown`         |
//! | `year`   | `String` | Capture year as `YYYY`, or `Unknown`               |
//! | `month`  | `String` | Capture month as `MM`, or `Unknown`                |
//! | `day`    | `String` | Capture day as `DD`, or `Unknown`                  |
//! | `name`   | `String` | Original file name without its extension           |
//! | `ext`    | `String` | Lowercased extension with leading dot (may be `""`)|
//!
//! # Example
//!
//! ```
//! use snapsort_library::FilenamePattern;
//! use time::macros::date;
//!
//! let pattern: FilenamePattern = "{{ date }}_{{ name }}{{ ext }}".parse().unwrap();
//! let name = pattern.render(Some(date!(2023-06-15)), "IMG_1234", ".jpg").unwrap();
//! assert_eq!(name, "2023-06-15_IMG_1234.jpg");
//! ```

use std::str::FromStr;

use exn::ResultExt;
use time::Date;
use upon::{Engine, Template};

use crate::error::{Error, ErrorKind, Result};

/// The stock filename layout: date prefix, original name, extension.
pub const DEFAULT_FILENAME_PATTERN: &str = "{{ date }}_{{ name }}{{ ext }}";

/// Placeholder used for the `date` variable when no capture date exists.
const UNKNOWN_DATE: &str = "Unknown";

/// Renders destination file names from a compiled template.
///
/// Constructed via [`FromStr`], which compiles the template eagerly so that
/// syntax errors surface at creation time rather than at render time. The
/// compiled template is reusable across many [`render`](Self::render) calls.
pub struct FilenamePattern {
    engine: Engine<'static>,
    template: Template<'static>,
}

impl FromStr for FilenamePattern {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let engine = Engine::new();
        // Compile the template early so we can fail-fast in construction.
        let template = engine.compile(s.to_string()).or_raise(|| ErrorKind::Template)?;
        Ok(Self { engine, template })
    }
}

impl Default for FilenamePattern {
    fn default() -> Self {
        // Infallible: the stock pattern is valid template syntax.
        DEFAULT_FILENAME_PATTERN.parse().unwrap_or_else(|_| unreachable!())
    }
}

impl FilenamePattern {
    /// Renders a single file name. The result must stay a single path
    /// segment; templates that render separators or an empty string are
    /// rejected.
    pub fn render(&self, date: Option<Date>, name: &str, ext: &str) -> Result<String> {
        let (date, year, month, day) = match date {
            Some(date) => (
                format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day()),
                format!("{:04}", date.year()),
                format!("{:02}", u8::from(date.month())),
                format!("{:02}", date.day()),
            ),
            None => {
                let unknown = || UNKNOWN_DATE.to_string();
                (unknown(), unknown(), unknown(), unknown())
            },
        };
        let rendered = self
            .template
            .render(&self.engine, upon::value! { date: date, year: year, month: month, day: day, name: name, ext: ext })
            .to_string()
            .or_raise(|| ErrorKind::Template)?;
        let rendered = rendered.trim().to_string();
        if rendered.is_empty() || rendered.contains(['/', '\\']) || rendered == "." || rendered == ".." {
            exn::bail!(ErrorKind::Template);
        }
        Ok(rendered)
    }
}
