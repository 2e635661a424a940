//! Non-mutating collection builders
//!
//! Every builder borrows its base collection and returns a new handle. When
//! the parameters describe a no-op the base itself is returned (a new
//! reference to the same node, no wrapper added).

use std::sync::Arc;

use super::node::{Collection, CollectionKind, CollectionNode, ATTR_FIELD, ATTR_TYPE};

/// Sort direction attribute of order nodes
pub const ATTR_DIRECTION: &str = "direction";
/// Offset attribute of limit nodes
pub const ATTR_START: &str = "start";
/// Length attribute of limit nodes
pub const ATTR_LENGTH: &str = "length";

/// Order by a property value
pub const ORDER_BY_VALUE: &str = "value";
/// Order by media id
pub const ORDER_BY_ID: &str = "id";
/// Shuffle
pub const ORDER_BY_RANDOM: &str = "random";

pub const DIRECTION_ASC: &str = "ASC";
pub const DIRECTION_DESC: &str = "DESC";

/// Wrap `base` in a single order node.
///
/// `property` follows the client ordering syntax: a leading `-` sorts
/// descending, `id` sorts by media id, `random` shuffles and anything else
/// sorts by that property's value.
pub fn add_order_operator(base: &Collection, property: &str) -> Collection {
    let (direction, name) = match property.strip_prefix('-') {
        Some(rest) => (DIRECTION_DESC, rest),
        None => (DIRECTION_ASC, property),
    };

    let node = CollectionNode::new(CollectionKind::Order).with_operand(base);
    let node = match name {
        ORDER_BY_RANDOM => node.with_attribute(ATTR_TYPE, ORDER_BY_RANDOM),
        ORDER_BY_ID => node
            .with_attribute(ATTR_TYPE, ORDER_BY_ID)
            .with_attribute(ATTR_DIRECTION, direction),
        field => node
            .with_attribute(ATTR_TYPE, ORDER_BY_VALUE)
            .with_attribute(ATTR_FIELD, field)
            .with_attribute(ATTR_DIRECTION, direction),
    };
    node.into_shared()
}

/// Wrap `base` in one order node per property.
///
/// The first property ends up outermost and is the primary key; each
/// following property only breaks ties left by the ones before it. With no
/// properties the base is returned unchanged.
pub fn add_order_operators<S: AsRef<str>>(base: &Collection, properties: &[S]) -> Collection {
    properties
        .iter()
        .rev()
        .fold(Arc::clone(base), |current, property| {
            add_order_operator(&current, property.as_ref())
        })
}

/// Wrap `base` in a limit node.
///
/// `start` is a 0-based offset and a `length` of 0 means "until the end".
/// `start == 0 && length == 0` disables the limit and returns the base.
pub fn add_limit_operator(base: &Collection, start: u32, length: u32) -> Collection {
    if start == 0 && length == 0 {
        return Arc::clone(base);
    }

    CollectionNode::new(CollectionKind::Limit)
        .with_operand(base)
        .with_attribute(ATTR_START, start)
        .with_attribute(ATTR_LENGTH, length)
        .into_shared()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_order_is_identity() {
        let base = CollectionNode::universe();
        let no_props: [&str; 0] = [];
        let ordered = add_order_operators(&base, &no_props);
        assert!(Arc::ptr_eq(&ordered, &base));
    }

    #[test]
    fn test_disabled_limit_is_identity() {
        let base = CollectionNode::id_list([1, 2, 3]);
        let limited = add_limit_operator(&base, 0, 0);
        assert!(Arc::ptr_eq(&limited, &base));
    }

    #[test]
    fn test_first_property_is_outermost() {
        let base = CollectionNode::universe();
        let ordered = add_order_operators(&base, &["artist", "-album", "id"]);

        assert_eq!(ordered.kind(), CollectionKind::Order);
        assert_eq!(ordered.attribute_str(ATTR_FIELD), Some("artist"));
        assert_eq!(ordered.attribute_str(ATTR_DIRECTION), Some(DIRECTION_ASC));

        let second = ordered.operand().unwrap();
        assert_eq!(second.attribute_str(ATTR_FIELD), Some("album"));
        assert_eq!(second.attribute_str(ATTR_DIRECTION), Some(DIRECTION_DESC));

        let third = second.operand().unwrap();
        assert_eq!(third.attribute_str(ATTR_TYPE), Some(ORDER_BY_ID));
        assert!(Arc::ptr_eq(third.operand().unwrap(), &base));
    }

    #[test]
    fn test_random_order_has_no_direction() {
        let ordered = add_order_operator(&CollectionNode::universe(), "random");
        assert_eq!(ordered.attribute_str(ATTR_TYPE), Some(ORDER_BY_RANDOM));
        assert!(ordered.attribute(ATTR_DIRECTION).is_none());
    }

    #[test]
    fn test_limit_wraps_order() {
        let base = CollectionNode::universe();
        let ordered = add_order_operators(&base, &["title"]);
        let limited = add_limit_operator(&ordered, 10, 5);

        assert_eq!(limited.kind(), CollectionKind::Limit);
        assert_eq!(limited.attribute(ATTR_START).and_then(|v| v.as_int()), Some(10));
        assert_eq!(limited.attribute(ATTR_LENGTH).and_then(|v| v.as_int()), Some(5));
        assert!(Arc::ptr_eq(limited.operand().unwrap(), &ordered));
    }

    #[test]
    fn test_builders_do_not_touch_base() {
        let base = CollectionNode::id_list([5, 6]);
        let snapshot = (*base).clone();
        let _ = add_limit_operator(&add_order_operators(&base, &["x", "y"]), 1, 0);
        assert_eq!(*base, snapshot);
        assert_eq!(Arc::strong_count(&base), 1);
    }
}
