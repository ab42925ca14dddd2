use std::iter::Peekable;
use std::slice;

use serde::Serialize;

use super::Heading;

/// A heading together with the headings nested under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineNode {
    pub heading: Heading,
    pub children: Vec<OutlineNode>,
}

impl OutlineNode {
    /// Number of headings in this subtree, itself included.
    pub fn heading_count(&self) -> usize {
        1 + self.children.iter().map(OutlineNode::heading_count).sum::<usize>()
    }
}

/// Rebuild the section tree from headings in document order. Each heading nests
/// under the nearest preceding heading with a lower level; skipped levels
/// (`==` followed by `====`) nest directly.
pub fn build(headings: &[Heading]) -> Vec<OutlineNode> {
    let mut iter = headings.iter().peekable();
    let mut roots = Vec::new();
    // Every heading left at the top is a root, whatever its level.
    while let Some(heading) = iter.next() {
        let children = build_level(&mut iter, heading.level);
        roots.push(OutlineNode {
            heading: heading.clone(),
            children,
        });
    }
    roots
}

fn build_level(
    iter: &mut Peekable<slice::Iter<'_, Heading>>,
    parent_level: u8,
) -> Vec<OutlineNode> {
    let mut nodes = Vec::new();
    while let Some(heading) = iter.next_if(|h| h.level > parent_level) {
        let children = build_level(iter, heading.level);
        nodes.push(OutlineNode {
            heading: heading.clone(),
            children,
        });
    }
    nodes
}
