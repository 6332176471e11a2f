use std::fmt;

use downcast_rs::{impl_downcast, DowncastSync};

/// Identity of a registered action.
///
/// Ids are dense: the n-th action registered on a builder gets id `n`, and
/// the same number indexes both the record table and the in-flight map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(pub usize);

impl ActionId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position of the action in registration order.
    pub const fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for ActionId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action#{}", self.0)
    }
}

/// The three flavors of registered action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Consumes an input and produces a value for the result callback.
    Get,
    /// Consumes an input; only failures are delivered.
    Set,
    /// Takes no input; only failures are delivered.
    Void,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Get => "get",
            ActionKind::Set => "set",
            ActionKind::Void => "void",
        };
        f.write_str(name)
    }
}

/// A type-erased action input.
///
/// Work units compare pending inputs to decide whether a new request
/// supersedes the running one, and snapshots clone them, so every payload
/// must support both. Any `Clone + PartialEq + Debug + Send + Sync + 'static`
/// type is a payload through the blanket implementation.
pub trait Payload: DowncastSync + fmt::Debug {
    /// Value equality across erased types; values of different concrete
    /// types are never equal.
    fn eq_payload(&self, other: &dyn Payload) -> bool;

    /// Clones the value behind a fresh box.
    fn clone_payload(&self) -> BoxedPayload;

    /// Name of the concrete type, for diagnostics.
    fn payload_type(&self) -> &'static str;
}

impl_downcast!(sync Payload);

impl<T> Payload for T
where
    T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
{
    fn eq_payload(&self, other: &dyn Payload) -> bool {
        other.downcast_ref::<T>().is_some_and(|other| self == other)
    }

    fn clone_payload(&self) -> BoxedPayload {
        Box::new(self.clone())
    }

    fn payload_type(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

pub type BoxedPayload = Box<dyn Payload>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_values_of_same_type_compare_equal() {
        let a: BoxedPayload = Box::new(String::from("ab"));
        let b: BoxedPayload = Box::new(String::from("ab"));
        let c: BoxedPayload = Box::new(String::from("abcd"));

        assert!(a.eq_payload(&*b));
        assert!(!a.eq_payload(&*c));
    }

    #[test]
    fn values_of_different_types_never_compare_equal() {
        let a: BoxedPayload = Box::new(1u32);
        let b: BoxedPayload = Box::new(1u64);

        assert!(!a.eq_payload(&*b));
        assert!(!b.eq_payload(&*a));
    }

    #[test]
    fn clone_keeps_concrete_type() {
        let source: BoxedPayload = Box::new(vec![1, 2, 3]);
        let copy = source.clone_payload();

        assert_eq!(copy.downcast_ref::<Vec<i32>>(), Some(&vec![1, 2, 3]));
        assert_eq!(copy.payload_type(), std::any::type_name::<Vec<i32>>());
    }

    #[test]
    fn unit_is_a_payload() {
        let a: BoxedPayload = Box::new(());
        assert!(a.eq_payload(&()));
    }

    #[test]
    fn action_id_display() {
        assert_eq!(ActionId::new(3).to_string(), "action#3");
        assert_eq!(ActionId::from(7).index(), 7);
    }
}
