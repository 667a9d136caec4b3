//! Reconstruction of the differential snapshot hierarchy.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::TreeError;
use crate::header::HeaderRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Image { path: PathBuf, header: HeaderRecord },
    /// Stands in for a parent that is referenced but wasn't among the inputs.
    Missing { uuid: Uuid },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub kind: NodeKind,
    /// In the order the children appeared in the input.
    pub children: Vec<TreeNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Enter,
    Leave,
}

impl TreeNode {
    pub fn uuid(&self) -> Option<Uuid> {
        match &self.kind {
            NodeKind::Image { header, .. } => header.uuid,
            NodeKind::Missing { uuid } => Some(*uuid),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.kind {
            NodeKind::Image { path, .. } => Some(path),
            NodeKind::Missing { .. } => None,
        }
    }

    pub fn header(&self) -> Option<&HeaderRecord> {
        match &self.kind {
            NodeKind::Image { header, .. } => Some(header),
            NodeKind::Missing { .. } => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.kind, NodeKind::Missing { .. })
    }

    /// Number of levels in this subtree, counting the node itself.
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(TreeNode::depth).max().unwrap_or(0)
    }

    /// Depth-first walk. `visit` sees every node twice, before and after its children.
    pub fn walk<E, F>(&self, level: usize, visit: &mut F) -> Result<(), E>
    where
        F: FnMut(&TreeNode, usize, Visit) -> Result<(), E>,
    {
        visit(self, level, Visit::Enter)?;
        for child in &self.children {
            child.walk(level + 1, visit)?;
        }
        visit(self, level, Visit::Leave)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Forest {
    roots: Vec<TreeNode>,
}

impl Forest {
    pub fn roots(&self) -> &[TreeNode] {
        &self.roots
    }

    pub fn into_roots(self) -> Vec<TreeNode> {
        self.roots
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// True for a forest holding one image and nothing else.
    pub fn is_single(&self) -> bool {
        matches!(self.roots.as_slice(), [root] if root.children.is_empty())
    }

    pub fn walk<E, F>(&self, start_level: usize, visit: &mut F) -> Result<(), E>
    where
        F: FnMut(&TreeNode, usize, Visit) -> Result<(), E>,
    {
        for root in &self.roots {
            root.walk(start_level, visit)?;
        }
        Ok(())
    }
}

/// Builds the snapshot forest for a set of images.
///
/// An image is a child of the image whose UUID matches its parent UUID. Images whose parent is
/// not in the set become roots; if they do name a parent, the root is a [`NodeKind::Missing`]
/// placeholder for it. Roots and children keep the input order.
///
/// An image naming itself as parent is treated like one whose parent is missing. Fails if two
/// images share a UUID, or if parent references between distinct images form a cycle.
pub fn build_forest<I>(images: I) -> Result<Forest, TreeError>
where
    I: IntoIterator<Item = (PathBuf, HeaderRecord)>,
{
    let images: Vec<(PathBuf, HeaderRecord)> = images.into_iter().collect();

    let mut by_uuid: HashMap<Uuid, usize> = HashMap::with_capacity(images.len());
    for (index, (path, header)) in images.iter().enumerate() {
        let Some(uuid) = header.uuid else {
            continue;
        };
        if let Some(&first) = by_uuid.get(&uuid) {
            return Err(TreeError::DuplicateUuid {
                uuid,
                first: images[first].0.clone(),
                second: path.clone(),
            });
        }
        by_uuid.insert(uuid, index);
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); images.len()];
    let mut roots = Vec::new();
    for (index, (_, header)) in images.iter().enumerate() {
        match header.parent_uuid.and_then(|parent| by_uuid.get(&parent)) {
            // An image never parents itself.
            Some(&parent) if parent != index => children[parent].push(index),
            _ => roots.push(index),
        }
    }

    let mut visited = vec![false; images.len()];
    let mut forest = Vec::with_capacity(roots.len());
    for index in roots {
        let Some(node) = assemble(index, &images, &children, &mut visited) else {
            continue;
        };
        let (path, header) = &images[index];
        match header.parent_uuid {
            Some(parent) => {
                tracing::warn!("{}: parent {} not found", path.display(), parent);
                forest.push(TreeNode {
                    kind: NodeKind::Missing { uuid: parent },
                    children: vec![node],
                });
            }
            None => forest.push(node),
        }
    }

    // Every image has at most one parent, so anything not reachable from a root sits on a cycle.
    if let Some(index) = visited.iter().position(|seen| !seen) {
        let (path, header) = &images[index];
        return Err(TreeError::CyclicParent {
            uuid: header.parent_uuid.or(header.uuid).unwrap_or_default(),
            path: path.clone(),
        });
    }

    Ok(Forest { roots: forest })
}

fn assemble(
    index: usize,
    images: &[(PathBuf, HeaderRecord)],
    children: &[Vec<usize>],
    visited: &mut [bool],
) -> Option<TreeNode> {
    if std::mem::replace(&mut visited[index], true) {
        return None;
    }

    let (path, header) = &images[index];
    Some(TreeNode {
        kind: NodeKind::Image {
            path: path.clone(),
            header: *header,
        },
        children: children[index]
            .iter()
            .filter_map(|&child| assemble(child, images, children, visited))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{ImageType, Version};

    fn image(name: &str, uuid: u128, parent: u128) -> (PathBuf, HeaderRecord) {
        let id = |v: u128| (v != 0).then(|| Uuid::from_u128(v));
        (
            PathBuf::from(name),
            HeaderRecord {
                version: Version::SUPPORTED,
                image_type: if parent == 0 {
                    ImageType::Dynamic
                } else {
                    ImageType::Differential
                },
                flags: 0,
                disk_size: 1 << 30,
                block_size: 1 << 20,
                total_blocks: 1024,
                allocated_blocks: 0,
                uuid: id(uuid),
                snapshot_uuid: None,
                parent_uuid: id(parent),
            },
        )
    }

    fn name(node: &TreeNode) -> String {
        match node.path() {
            Some(path) => path.display().to_string(),
            None => format!("missing:{}", node.uuid().unwrap().as_u128()),
        }
    }

    fn shape(node: &TreeNode) -> String {
        if node.children.is_empty() {
            return name(node);
        }
        let children: Vec<String> = node.children.iter().map(shape).collect();
        format!("{}[{}]", name(node), children.join(","))
    }

    fn shapes(forest: &Forest) -> Vec<String> {
        forest.roots().iter().map(shape).collect()
    }

    #[test]
    fn independent_images_are_roots() {
        let forest =
            build_forest([image("a", 1, 0), image("b", 2, 0), image("c", 3, 0)]).unwrap();
        assert_eq!(shapes(&forest), ["a", "b", "c"]);
        assert!(forest.roots().iter().all(|r| !r.is_placeholder()));
    }

    #[test]
    fn child_under_parent() {
        let forest = build_forest([image("snap", 2, 1), image("base", 1, 0)]).unwrap();
        assert_eq!(shapes(&forest), ["base[snap]"]);
    }

    #[test]
    fn snapshot_chain() {
        let forest = build_forest([
            image("base", 1, 0),
            image("snap1", 2, 1),
            image("snap2", 3, 2),
        ])
        .unwrap();
        assert_eq!(shapes(&forest), ["base[snap1[snap2]]"]);
        assert_eq!(forest.roots()[0].depth(), 3);
    }

    #[test]
    fn children_keep_input_order() {
        let forest = build_forest([
            image("b2", 12, 1),
            image("base", 1, 0),
            image("b1", 11, 1),
            image("b3", 13, 1),
        ])
        .unwrap();
        assert_eq!(shapes(&forest), ["base[b2,b1,b3]"]);
    }

    #[test]
    fn missing_parent_gets_placeholder() {
        let forest = build_forest([image("orphan", 2, 99), image("other", 3, 0)]).unwrap();
        assert_eq!(shapes(&forest), ["missing:99[orphan]", "other"]);

        let root = &forest.roots()[0];
        assert!(root.is_placeholder());
        assert_eq!(root.path(), None);
        assert_eq!(root.header(), None);
    }

    #[test]
    fn each_orphan_gets_its_own_placeholder() {
        let forest = build_forest([image("a", 2, 99), image("b", 3, 99)]).unwrap();
        assert_eq!(shapes(&forest), ["missing:99[a]", "missing:99[b]"]);
    }

    #[test]
    fn image_without_uuid_is_kept() {
        let forest = build_forest([image("anon", 0, 0), image("other", 1, 0)]).unwrap();
        assert_eq!(forest.len(), 2);
        assert_eq!(forest.roots()[0].uuid(), None);
    }

    #[test]
    fn duplicate_uuid_is_rejected() {
        let err = build_forest([image("a", 1, 0), image("b", 1, 0)]).unwrap_err();
        assert_eq!(
            err,
            TreeError::DuplicateUuid {
                uuid: Uuid::from_u128(1),
                first: PathBuf::from("a"),
                second: PathBuf::from("b"),
            }
        );
    }

    #[test]
    fn mutual_parents_are_a_cycle() {
        let err = build_forest([image("base", 5, 0), image("a", 1, 2), image("b", 2, 1)])
            .unwrap_err();
        assert_eq!(
            err,
            TreeError::CyclicParent {
                uuid: Uuid::from_u128(2),
                path: PathBuf::from("a"),
            }
        );
    }

    #[test]
    fn self_parent_is_wrapped_like_an_orphan() {
        let forest = build_forest([image("loop", 7, 7), image("base", 1, 0)]).unwrap();
        assert_eq!(shapes(&forest), ["missing:7[loop]", "base"]);
        assert!(forest.roots()[0].is_placeholder());
    }

    #[test]
    fn empty_input() {
        let forest = build_forest(Vec::new()).unwrap();
        assert!(forest.is_empty());
        assert!(!forest.is_single());
    }

    #[test]
    fn walk_visits_in_order() {
        let forest = build_forest([image("base", 1, 0), image("snap", 2, 1)]).unwrap();
        let mut events = Vec::new();
        forest
            .walk(0, &mut |node: &TreeNode, level, visit| {
                events.push((name(node), level, visit));
                Ok::<(), ()>(())
            })
            .unwrap();
        assert_eq!(
            events,
            [
                ("base".to_string(), 0, Visit::Enter),
                ("snap".to_string(), 1, Visit::Enter),
                ("snap".to_string(), 1, Visit::Leave),
                ("base".to_string(), 0, Visit::Leave),
            ]
        );
    }
}
