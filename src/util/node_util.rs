use std::sync::Arc;

use crate::{WzNode, WzNodeArc, WzNodeCast, WzObjectType};

/// Wrapper around `node.write().unwrap().parse(&node)`.
pub fn parse_node(node: &WzNodeArc) -> Result<(), crate::node::Error> {
    node.write().unwrap().parse(node)
}

/// Make sure every node below `node` points back at its actual parent.
/// Used after cloning or grafting subtrees.
pub fn resolve_childs_parent(node: &WzNodeArc) {
    let node_read = node.read().unwrap();
    for child in node_read.children.values() {
        child.write().unwrap().parent = Arc::downgrade(node);
        resolve_childs_parent(child);
    }
}

/// Depth-first traversal. With `force_parse` lazy containers are parsed on
/// the way down and images unparsed again on the way out, keeping memory
/// flat on full-archive walks.
pub fn walk_node(node: &WzNodeArc, force_parse: bool, f: &dyn Fn(&WzNodeArc)) {
    if force_parse {
        let _ = parse_node(node);
    }

    f(node);

    for child in node.read().unwrap().children.values() {
        walk_node(child, force_parse, f);
    }

    if force_parse {
        let is_image = node.read().unwrap().try_as_image().is_some();
        if is_image {
            node.write().unwrap().unparse();
        }
    }
}

/// Resolve a link node's relative path, starting from its parent.
///
/// `..` walks one level up; any other component walks down. Stepping up
/// out of an image leaves its namespace, and the first failed down-walk
/// after that retries `name + ".img"`, which is how links reach sibling
/// images. Children are looked up as-is; parse the tree first when the
/// target may still be lazy.
pub fn resolve_uol(node: &WzNodeArc) -> Option<WzNodeArc> {
    let path = {
        let read = node.read().unwrap();
        read.try_as_uol()?.to_owned()
    };
    if path.is_empty() {
        return None;
    }

    let mut current = node.read().unwrap().parent.upgrade()?;
    let mut crossed_image = false;

    for part in path.split('/') {
        let next = if part == ".." {
            let read = current.read().unwrap();
            let leaving_image = matches!(read.object_type, WzObjectType::Image(_));
            let parent = read.parent.upgrade();
            drop(read);

            if leaving_image && parent.is_some() {
                crossed_image = true;
            }
            parent
        } else {
            let found = current.read().unwrap().at(part);
            match found {
                Some(found) => Some(found),
                None if crossed_image => {
                    let retry = current.read().unwrap().at(&format!("{part}.img"));
                    if let Some(node) = &retry {
                        if node.read().unwrap().try_as_image().is_some() {
                            crossed_image = false;
                        }
                    }
                    retry
                }
                None => None,
            }
        };

        current = next?;
    }

    Some(current)
}
