// The FAT32 engine: image backing store, geometry, FAT table manager,
// cluster chain I/O, directory codec and operations, session verbs, and
// best-effort undelete.

pub mod constants;
pub mod dir_entry;
pub mod formatter;
pub mod geometry;
pub mod image;
pub mod validator;
pub mod volume;

mod chain;
mod ops;
mod recovery;
mod table;

pub use dir_entry::DirEntry;
pub use formatter::{format_volume, FormatOptions};
pub use geometry::Bpb;
pub use image::FsImage;
pub use validator::{validate, ValidationReport};
pub use volume::{Fat32Volume, VolumeSummary};
