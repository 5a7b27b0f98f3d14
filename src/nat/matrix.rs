//! Pure hole-punching feasibility matrix: a deterministic decision
//! function kept free of relay-selection side effects, which are
//! injected separately as a collaborator.

use crate::store::models::NatType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalMethod {
    Direct,
    Stun,
    Turn,
}

/// `coordinate(natA, natB)` is a pure function of this matrix, ignoring
/// relay-pool side effects.
///
/// Symmetric tie-break: if either side is `none`, the pair goes direct;
/// otherwise if either side is `symmetric` or `unknown`, the pair needs a
/// relay; anything else in between (full cone / restricted / port
/// restricted, in any combination, including a side with itself) can
/// attempt STUN-assisted hole punching.
pub fn decide(a: NatType, b: NatType) -> TraversalMethod {
    if a == NatType::None || b == NatType::None {
        return TraversalMethod::Direct;
    }
    if a == NatType::Symmetric || b == NatType::Symmetric || a == NatType::Unknown || b == NatType::Unknown {
        return TraversalMethod::Turn;
    }
    TraversalMethod::Stun
}

#[cfg(test)]
mod tests {
    use super::*;
    use NatType::*;

    #[test]
    fn none_is_always_direct() {
        for other in [None, FullCone, RestrictedCone, PortRestrictedCone, Symmetric, Unknown] {
            assert_eq!(decide(NatType::None, other), TraversalMethod::Direct);
            assert_eq!(decide(other, NatType::None), TraversalMethod::Direct);
        }
    }

    #[test]
    fn symmetric_always_needs_turn_except_against_none() {
        for other in [FullCone, RestrictedCone, PortRestrictedCone, Symmetric, Unknown] {
            assert_eq!(decide(Symmetric, other), TraversalMethod::Turn);
            assert_eq!(decide(other, Symmetric), TraversalMethod::Turn);
        }
    }

    #[test]
    fn cone_types_attempt_stun() {
        assert_eq!(decide(FullCone, FullCone), TraversalMethod::Stun);
        assert_eq!(decide(FullCone, RestrictedCone), TraversalMethod::Stun);
        assert_eq!(decide(RestrictedCone, PortRestrictedCone), TraversalMethod::Stun);
        assert_eq!(decide(PortRestrictedCone, PortRestrictedCone), TraversalMethod::Stun);
    }

    #[test]
    fn unknown_behaves_like_symmetric_except_against_none() {
        assert_eq!(decide(Unknown, FullCone), TraversalMethod::Turn);
        assert_eq!(decide(Unknown, NatType::None), TraversalMethod::Direct);
    }

    #[test]
    fn s4_scenario_matches_spec() {
        assert_eq!(decide(Symmetric, PortRestrictedCone), TraversalMethod::Turn);
        assert_eq!(decide(FullCone, FullCone), TraversalMethod::Stun);
    }
}
