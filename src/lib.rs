//! Reader for the MapleStory WZ (`PKG1`) archive format: nested,
//! versioned, partially encrypted containers of directories, typed
//! property trees, bitmaps and sound blobs.
//!
//! ```no_run
//! use wz_archive::{WzNode, WzNodeCast};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let root = WzNode::from_wz_file("Character.wz", None)?.into_lock();
//! root.write().unwrap().parse(&root)?;
//!
//! let weapon = root.read().unwrap().at_path("Weapon/01302000.img");
//! # Ok(())
//! # }
//! ```

pub mod directory;
pub mod file;
pub mod header;
pub mod node;
mod node_cast;
mod object;
pub mod property;
pub mod reader;
pub mod util;
pub mod version;
pub mod wz_image;

pub use directory::WzDirectory;
pub use file::{merge_wz_file, WzFile, WzFileMeta};
pub use header::WzHeader;
pub use node::{WzNode, WzNodeArc, WzNodeArcVec, WzNodeName};
pub use node_cast::WzNodeCast;
pub use object::WzObjectType;
pub use reader::{Reader, WzReader, WzSliceReader};
pub use util::node_util::{parse_node, resolve_childs_parent, resolve_uol, walk_node};
pub use wz_image::WzImage;
