//! WAV chunk I/O — RIFF walker, BEXT/iXML/LIST-INFO codecs, atomic writer.
//!
//! The writer owns exactly three chunks (`bext`, `iXML`, `LIST`-`INFO`);
//! everything else, including the audio `data` chunk, is stream-copied
//! byte-for-byte.

pub mod bext;
pub mod info;
pub mod ixml;
pub mod reader;
pub mod riff;
pub mod writer;

pub use reader::{apply_import_fallbacks, compute_file_hash, read_metadata, WavMetadata};
pub use writer::{write_metadata, MetadataWriteSet};
