use serde::{Deserialize, Serialize};

/// Defines the policy used to deactivate (and re-activate) yield surfaces
///
/// The hybrid variants escalate from the cheaper stage to the next one only after
/// the former exhausts its repair actions.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeactivationScheme {
    /// Deactivates a surface as soon as its multiplier becomes negative during Newton
    Optimized,

    /// Runs Newton to convergence, then deactivates the surfaces with negative multipliers
    Safe,

    /// Enumerates all combinations of active surfaces (most violated first)
    Dumb,

    /// Optimized, then safe
    OptimizedToSafe,

    /// Safe, then dumb
    SafeToDumb,

    /// Optimized, then safe, then dumb
    OptimizedToSafeToDumb,

    /// Optimized, then dumb
    OptimizedToDumb,
}

/// Defines a stage of a deactivation scheme
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Newton with immediate deactivation of negative multipliers
    Optimized,

    /// Newton to convergence followed by the Kuhn-Tucker and admissibility repairs
    Safe,

    /// Enumeration of the combinations of active surfaces
    Dumb,
}

/// Defines the fidelity level of the tangent operator
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TangentOperator {
    /// The elasticity tensor
    Elastic,

    /// Consistent for yield functions that are linear in stress (final active set only)
    Linear,

    /// Fully consistent operator (all surfaces ever active during sub-stepping)
    Nonlinear,
}

impl DeactivationScheme {
    /// Returns the ordered sequence of stages
    pub fn stages(&self) -> Vec<Stage> {
        match self {
            DeactivationScheme::Optimized => vec![Stage::Optimized],
            DeactivationScheme::Safe => vec![Stage::Safe],
            DeactivationScheme::Dumb => vec![Stage::Dumb],
            DeactivationScheme::OptimizedToSafe => vec![Stage::Optimized, Stage::Safe],
            DeactivationScheme::SafeToDumb => vec![Stage::Safe, Stage::Dumb],
            DeactivationScheme::OptimizedToSafeToDumb => vec![Stage::Optimized, Stage::Safe, Stage::Dumb],
            DeactivationScheme::OptimizedToDumb => vec![Stage::Optimized, Stage::Dumb],
        }
    }

    /// Returns the stages allowed for the current substep
    ///
    /// A dumb stage reached through a fallback is only kept if the substep is small enough.
    pub fn stages_for_substep(&self, can_revert_to_dumb: bool) -> Vec<Stage> {
        let all = self.stages();
        if all.len() == 1 || can_revert_to_dumb {
            return all;
        }
        all.into_iter().filter(|s| *s != Stage::Dumb).collect()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::{DeactivationScheme, Stage, TangentOperator};

    #[test]
    fn derive_works() {
        let scheme = DeactivationScheme::OptimizedToSafe;
        let clone = scheme.clone();
        assert_eq!(scheme, clone);
        assert_eq!(format!("{:?}", scheme), "OptimizedToSafe");
        let json = serde_json::to_string(&scheme).unwrap();
        assert_eq!(json, "\"optimized_to_safe\"");
        let from_json: TangentOperator = serde_json::from_str("\"nonlinear\"").unwrap();
        assert_eq!(from_json, TangentOperator::Nonlinear);
    }

    #[test]
    fn stage_derive_works() {
        let stage = Stage::Safe;
        assert_eq!(format!("{:?}", stage), "Safe");
        assert_eq!(serde_json::to_string(&Stage::Optimized).unwrap(), "\"optimized\"");
        let from_json: Stage = serde_json::from_str("\"dumb\"").unwrap();
        assert_eq!(from_json, Stage::Dumb);
    }

    #[test]
    fn stages_works() {
        assert_eq!(DeactivationScheme::Optimized.stages(), &[Stage::Optimized]);
        assert_eq!(DeactivationScheme::Dumb.stages(), &[Stage::Dumb]);
        assert_eq!(
            DeactivationScheme::OptimizedToSafeToDumb.stages(),
            &[Stage::Optimized, Stage::Safe, Stage::Dumb]
        );
        assert_eq!(DeactivationScheme::OptimizedToDumb.stages(), &[Stage::Optimized, Stage::Dumb]);
    }

    #[test]
    fn stages_for_substep_works() {
        let scheme = DeactivationScheme::SafeToDumb;
        assert_eq!(scheme.stages_for_substep(false), &[Stage::Safe]);
        assert_eq!(scheme.stages_for_substep(true), &[Stage::Safe, Stage::Dumb]);
        assert_eq!(DeactivationScheme::Dumb.stages_for_substep(false), &[Stage::Dumb]);
    }
}
