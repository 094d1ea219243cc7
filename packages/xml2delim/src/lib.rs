//! xml2delim - Convert large XML documents to delimited text records.
//!
//! A declarative, ordered template maps XML structure to output codes.
//! The input is streamed: only elements whose local name is a top-level
//! template key are captured, each one handed off as soon as it closes, so
//! documents far larger than memory can be converted.
//!
//! # Example
//!
//! ```
//! use xml2delim::{transcode, BufferedEmitter, NoProgress, RootIndex, Template, TranscodeOptions};
//!
//! let template: Template =
//!     serde_json::from_str(r#"{"root": {"item": {"item": [".=name", "."]}}}"#).unwrap();
//! let index = RootIndex::build(&template).unwrap();
//!
//! let xml = r#"<root><item name="A">10</item><item name="B"></item></root>"#;
//! let mut out = BufferedEmitter::new(Vec::new(), 100);
//! transcode(xml.as_bytes(), &mut out, &index, &TranscodeOptions::default(), &NoProgress).unwrap();
//!
//! assert_eq!(String::from_utf8(out.finish().unwrap()).unwrap(), "item|A|10\nitem|B|\n");
//! ```
//!
//! # Architecture
//!
//! - [`config`]: Constants, option validation and template loading
//! - [`error`]: Error types and Result alias
//! - [`template`]: Template model and root index
//! - [`select`]: Restricted selection expressions
//! - [`field`]: Field specifier parsing and resolution
//! - [`line`]: Record line formatting
//! - [`interpret`]: Recursive template interpretation
//! - [`stream`]: Streaming source of matched subtrees
//! - [`emit`]: Output buffering and progress reporting
//! - [`transcoder`]: Driver tying the pieces together
//! - [`xml`]: XML utilities
//! - [`cli`]: Command-line interface

pub mod cli;
pub mod config;
pub mod emit;
pub mod error;
pub mod field;
pub mod interpret;
pub mod line;
pub mod select;
pub mod stream;
pub mod template;
pub mod transcoder;
pub mod xml;

// Re-export main functions
pub use transcoder::{transcode, transcode_file, TranscodeOptions};

// Re-export commonly used items
pub use emit::{BufferedEmitter, NoProgress, ProgressReporter, RecordSink, RunSummary};
pub use error::{Result, TranscodeError};
pub use interpret::Interpreter;
pub use line::LineFormatter;
pub use stream::{MatchedSubtree, SubtreeStream};
pub use template::{RootIndex, Template, TemplateValue};
