use hashbrown::{Equivalent, HashMap};
use std::fmt::Display;
use std::ops::Deref;
use std::path::Path;
use std::sync::{Arc, RwLock, Weak};
use thiserror::Error;

use crate::{directory, file, wz_image, WzFile, WzObjectType};

#[derive(Debug, Error)]
pub enum Error {
    #[error("error parsing directory: {0}")]
    Directory(#[from] directory::Error),

    #[error("error parsing file: {0}")]
    File(#[from] file::Error),

    #[error("error parsing image: {0}")]
    Image(#[from] wz_image::Error),

    #[error("node not found")]
    NotFound,
}

/// Cheap-to-clone node label, also the children map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct WzNodeName(Arc<str>);

impl Equivalent<WzNodeName> for str {
    fn equivalent(&self, key: &WzNodeName) -> bool {
        self == key.as_str()
    }
}

impl From<&str> for WzNodeName {
    fn from(s: &str) -> Self {
        WzNodeName(Arc::from(s))
    }
}

impl From<String> for WzNodeName {
    fn from(s: String) -> Self {
        WzNodeName(Arc::from(s))
    }
}

impl Deref for WzNodeName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for WzNodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl WzNodeName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A node of the archive tree.
///
/// Parents are weak references, so dropping the root drops the whole tree;
/// children are keyed by name, which is also the sibling-uniqueness
/// invariant of the format.
#[derive(Debug)]
pub struct WzNode {
    pub name: WzNodeName,
    pub object_type: WzObjectType,
    pub parent: Weak<RwLock<WzNode>>,
    pub children: HashMap<WzNodeName, WzNodeArc>,
}

pub type WzNodeArc = Arc<RwLock<WzNode>>;
pub type WzNodeArcVec = Vec<(WzNodeName, WzNodeArc)>;

impl From<WzNode> for WzNodeArc {
    fn from(node: WzNode) -> Self {
        node.into_lock()
    }
}

impl WzNode {
    pub fn new(
        name: &WzNodeName,
        object_type: impl Into<WzObjectType>,
        parent: Option<&WzNodeArc>,
    ) -> Self {
        Self {
            name: name.clone(),
            object_type: object_type.into(),
            parent: parent.map(Arc::downgrade).unwrap_or_default(),
            children: HashMap::new(),
        }
    }

    pub fn from_str(
        name: &str,
        object_type: impl Into<WzObjectType>,
        parent: Option<&WzNodeArc>,
    ) -> Self {
        Self::new(&name.into(), object_type, parent)
    }

    /// Open a `.wz` file and wrap it as an unparsed root node.
    pub fn from_wz_file<P>(path: P, parent: Option<&WzNodeArc>) -> Result<Self, file::Error>
    where
        P: AsRef<Path>,
    {
        let name = path
            .as_ref()
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();
        let wz_file = WzFile::from_file(&path)?;
        Ok(WzNode::from_str(name, wz_file, parent))
    }

    pub fn into_lock(self) -> WzNodeArc {
        Arc::new(RwLock::new(self))
    }

    /// Resolve this node's children if it is a lazily parsed container.
    /// The flag on the container flips only after the full set of children
    /// has been built and attached.
    pub fn parse(&mut self, current: &WzNodeArc) -> Result<(), Error> {
        let children: WzNodeArcVec = match &mut self.object_type {
            WzObjectType::Directory(directory) => {
                if directory.is_parsed {
                    return Ok(());
                }
                directory.resolve_children(current)?
            }
            WzObjectType::File(wz_file) => {
                if wz_file.is_parsed {
                    return Ok(());
                }
                wz_file.parse(current)?
            }
            WzObjectType::Image(image) => {
                if image.is_parsed {
                    return Ok(());
                }
                image.resolve_children(current)?
            }
            _ => return Ok(()),
        };

        self.children.reserve(children.len());
        for (name, child) in children {
            self.children.insert(name, child);
        }

        match &mut self.object_type {
            WzObjectType::Directory(directory) => directory.is_parsed = true,
            WzObjectType::File(wz_file) => wz_file.is_parsed = true,
            WzObjectType::Image(image) => image.is_parsed = true,
            _ => {}
        }

        Ok(())
    }

    /// Drop parsed children and mark the container unparsed again.
    pub fn unparse(&mut self) {
        match &mut self.object_type {
            WzObjectType::Directory(directory) => directory.is_parsed = false,
            WzObjectType::File(wz_file) => wz_file.is_parsed = false,
            WzObjectType::Image(image) => image.is_parsed = false,
            _ => return,
        }

        self.children.clear();
    }

    pub fn get_full_path(&self) -> String {
        let mut path = self.name.to_string();
        let mut parent = self.parent.upgrade();
        while let Some(parent_inner) = parent {
            let read = parent_inner.read().unwrap();
            path = format!("{}/{}", &read.name, path);
            parent = read.parent.upgrade();
        }
        path
    }

    pub fn at(&self, name: &str) -> Option<WzNodeArc> {
        self.children.get(name).map(Arc::clone)
    }

    pub fn at_relative(&self, path: &str) -> Option<WzNodeArc> {
        if path == ".." {
            self.parent.upgrade()
        } else {
            self.at(path)
        }
    }

    /// Walk a `/`-separated path through already-parsed children.
    pub fn at_path(&self, path: &str) -> Option<WzNodeArc> {
        let mut parts = path.split('/');
        let first = self.at(parts.next()?)?;
        parts.try_fold(first, |node, name| node.read().unwrap().at(name))
    }

    /// Walk a `/`-separated path, parsing lazy containers on the way.
    pub fn at_path_parsed(&self, path: &str) -> Result<WzNodeArc, Error> {
        let mut parts = path.split('/');

        let first = parts
            .next()
            .and_then(|name| self.at(name))
            .ok_or(Error::NotFound)?;

        parts.try_fold(first, |node, name| {
            let mut write = node.write().unwrap();
            write.parse(&node)?;
            write.at(name).ok_or(Error::NotFound)
        })
    }

    pub fn filter_parent<F>(&self, cb: F) -> Option<WzNodeArc>
    where
        F: Fn(&WzNode) -> bool,
    {
        let mut parent = self.parent.upgrade();
        loop {
            if let Some(parent_inner) = parent {
                let read = parent_inner.read().unwrap();
                if cb(&read) {
                    break Some(Arc::clone(&parent_inner));
                }
                parent = read.parent.upgrade();
            } else {
                break None;
            }
        }
    }

    pub fn get_parent_wz_image(&self) -> Option<WzNodeArc> {
        self.filter_parent(|node| matches!(node.object_type, WzObjectType::Image(_)))
    }

    /// Move all children to another node, leaving this one empty.
    pub fn transfer_childs(&mut self, to: &WzNodeArc) {
        let mut write = to.write().unwrap();
        write.children.reserve(self.children.len());
        for (name, child) in self.children.drain() {
            child.write().unwrap().parent = Arc::downgrade(to);
            write.children.insert(name, child);
        }
    }

    /// Deep copy of label, type, value and children. Parent links inside
    /// the copy point into the copy; the copy's own parent is empty.
    pub fn clone_tree(&self) -> WzNodeArc {
        let cloned = WzNode {
            name: self.name.clone(),
            object_type: self.object_type.clone(),
            parent: Weak::new(),
            children: self
                .children
                .iter()
                .map(|(name, child)| (name.clone(), child.read().unwrap().clone_tree()))
                .collect(),
        }
        .into_lock();

        crate::util::node_util::resolve_childs_parent(&cloned);

        cloned
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::property::{Vector2D, WzValue};

    fn sample_tree() -> WzNodeArc {
        let root = WzNode::from_str("root", WzValue::Null, None).into_lock();
        let a = WzNode::from_str("a", WzValue::Int(1), Some(&root)).into_lock();
        let b = WzNode::from_str("b", Vector2D(2, 3), Some(&a)).into_lock();

        a.write().unwrap().children.insert("b".into(), b);
        root.write().unwrap().children.insert("a".into(), a);
        root
    }

    #[test]
    fn path_computation_and_lookup() {
        let root = sample_tree();
        let b = root.read().unwrap().at_path("a/b").unwrap();

        assert_eq!(b.read().unwrap().get_full_path(), "root/a/b");
        assert!(root.read().unwrap().at_path("a/missing").is_none());

        let a = b.read().unwrap().at_relative("..").unwrap();
        assert_eq!(a.read().unwrap().name.as_str(), "a");
    }

    #[test]
    fn clone_tree_is_deep() {
        let root = sample_tree();
        let copy = root.read().unwrap().clone_tree();

        let original_b = root.read().unwrap().at_path("a/b").unwrap();
        let copied_b = copy.read().unwrap().at_path("a/b").unwrap();
        assert!(!Arc::ptr_eq(&original_b, &copied_b));

        // parent links inside the copy stay inside the copy
        let copied_a = copied_b.read().unwrap().parent.upgrade().unwrap();
        assert_eq!(copied_a.read().unwrap().get_full_path(), "root/a");
        let copied_root = copied_a.read().unwrap().parent.upgrade().unwrap();
        assert!(Arc::ptr_eq(&copied_root, &copy));
    }

    #[test]
    fn transfer_childs_relinks_parents() {
        let root = sample_tree();
        let other = WzNode::from_str("other", WzValue::Null, None).into_lock();

        let a = root.read().unwrap().at("a").unwrap();
        a.write().unwrap().transfer_childs(&other);

        assert!(a.read().unwrap().children.is_empty());
        let moved = other.read().unwrap().at("b").unwrap();
        let new_parent = moved.read().unwrap().parent.upgrade().unwrap();
        assert!(Arc::ptr_eq(&new_parent, &other));
    }
}
