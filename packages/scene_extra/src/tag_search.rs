//! Finding a tag node by display name.

use crate::host::{AnchorComponent, NodeMap};

/// Look up the first node named `required_name` and hand its anchor to
/// `callback`.
///
/// Only the first node with a matching name is considered. If that node has
/// no tag component the search ends with `None`, even when a later node of
/// the same name does carry one.
pub fn search_tag<T>(
    node_map: &NodeMap,
    required_name: &str,
    callback: impl FnOnce(&str, &AnchorComponent) -> Option<T>,
) -> Option<T> {
    let (reference, node) = node_map
        .iter()
        .find(|(_, node)| node.name == required_name)?;
    let anchor = node.anchor()?;
    callback(reference, anchor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{NodeComponent, TagNode};

    fn tag(icon: &str) -> NodeComponent {
        NodeComponent::Tag(AnchorComponent {
            icon: Some(icon.to_string()),
            ..AnchorComponent::default()
        })
    }

    #[test]
    fn test_first_matching_tag_found() {
        let map: NodeMap = [
            ("a".to_string(), TagNode::new("Pump", vec![tag("info")])),
            ("b".to_string(), TagNode::new("Pump", vec![tag("warning")])),
        ]
        .into_iter()
        .collect();

        let found = search_tag(&map, "Pump", |reference, anchor| {
            Some((reference.to_string(), anchor.icon.clone()))
        });
        assert_eq!(found, Some(("a".to_string(), Some("info".to_string()))));
    }

    #[test]
    fn test_first_name_match_without_tag_ends_search() {
        let map: NodeMap = [
            (
                "a".to_string(),
                TagNode::new("Light", vec![NodeComponent::Other("Mesh".to_string())]),
            ),
            ("b".to_string(), TagNode::new("Light", vec![tag("info")])),
        ]
        .into_iter()
        .collect();

        let mut called = false;
        let found = search_tag(&map, "Light", |_, _| {
            called = true;
            Some(())
        });
        assert!(found.is_none());
        assert!(!called);
    }

    #[test]
    fn test_no_match() {
        let map = NodeMap::new();
        assert!(search_tag(&map, "Pump", |_, _| Some(())).is_none());
    }
}
