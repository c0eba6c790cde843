//! Unit tests for evsim-core primitives.

#[cfg(test)]
mod ids {
    use crate::{EntityId, PortId};

    #[test]
    fn index_roundtrip() {
        let id = EntityId(42);
        assert_eq!(id.index(), 42);
        assert_eq!(EntityId::try_from(42usize).unwrap(), id);
    }

    #[test]
    fn invalid_sentinel_is_max() {
        assert_eq!(EntityId::INVALID.0, u32::MAX);
        assert_eq!(EntityId::default(), EntityId::INVALID);
    }

    #[test]
    fn display() {
        assert_eq!(EntityId(7).to_string(), "EntityId(7)");
        assert_eq!(PortId::new(EntityId(3), 1).to_string(), "PortId(3:1)");
    }

    #[test]
    fn port_identity_is_owner_and_slot() {
        let a = PortId::new(EntityId(1), 0);
        assert_eq!(a, PortId::new(EntityId(1), 0));
        assert_ne!(a, PortId::new(EntityId(1), 1));
        assert_ne!(a, PortId::new(EntityId(2), 0));
    }
}

#[cfg(test)]
mod time {
    use crate::Tick;

    #[test]
    fn tick_arithmetic() {
        let t = Tick(10);
        assert_eq!(t + 5, Tick(15));
        assert_eq!(Tick(15) - Tick(10), 5u64);
    }

    #[test]
    fn infinity_sorts_last() {
        assert!(Tick::INFINITY > Tick(u64::MAX - 1));
        assert!(Tick::INFINITY.is_infinite());
    }

    #[test]
    fn display() {
        assert_eq!(Tick(5).to_string(), "T5");
        assert_eq!(Tick::INFINITY.to_string(), "T∞");
    }
}

#[cfg(test)]
mod address {
    use crate::{Address, AddressParseError};

    #[test]
    fn child_and_parent() {
        let root = Address::root();
        let a = root.child(1).child(0);
        assert_eq!(a.as_slice(), &[1, 0]);
        assert_eq!(a.depth(), 2);
        assert_eq!(a.get(0), Some(1));
        assert_eq!(a.get(2), None);
        assert_eq!(a.parent(), Some(Address::new(vec![1])));
        assert_eq!(root.parent(), None);
    }

    #[test]
    fn subtree_membership() {
        let a = Address::new(vec![1, 0, 2]);
        assert!(a.starts_with(&Address::new(vec![1])));
        assert!(a.starts_with(&Address::root()));
        assert!(a.starts_with(&a));
        assert!(!a.starts_with(&Address::new(vec![0])));
    }

    #[test]
    fn display_and_parse() {
        let a = Address::new(vec![3, 0, 12]);
        assert_eq!(a.to_string(), "/3/0/12");
        assert_eq!("/3/0/12".parse::<Address>().unwrap(), a);
        assert_eq!("/".parse::<Address>().unwrap(), Address::root());
        assert_eq!(Address::root().to_string(), "/");
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(
            "1/2".parse::<Address>(),
            Err(AddressParseError::MissingRoot(_))
        ));
        assert!(matches!(
            "/1/x".parse::<Address>(),
            Err(AddressParseError::BadSegment { .. })
        ));
    }
}

#[cfg(test)]
mod rng {
    use crate::SimRng;

    #[test]
    fn same_seed_same_shuffle() {
        let mut a: Vec<u32> = (0..32).collect();
        let mut b = a.clone();
        SimRng::new(7).shuffle(&mut a);
        SimRng::new(7).shuffle(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let mut v: Vec<u32> = (0..100).collect();
        SimRng::new(1).shuffle(&mut v);
        v.sort_unstable();
        assert_eq!(v, (0..100).collect::<Vec<_>>());
    }
}

#[cfg(test)]
mod error {
    use crate::ErrorKind;

    #[test]
    fn kind_display() {
        assert_eq!(ErrorKind::Protocol.to_string(), "protocol");
        assert_eq!(ErrorKind::Precondition.to_string(), "precondition");
    }
}
