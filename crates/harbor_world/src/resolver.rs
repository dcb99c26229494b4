//! Conflict resolution: partitions systems into execution waves.
//!
//! The resolver groups registered systems into **waves** based on their
//! resolved access masks. Systems within a wave have no conflicts and run in
//! parallel. Waves execute sequentially with a join barrier between them.
//!
//! ## Placement
//!
//! Systems are visited in ascending `(priority, registration order)`. Each
//! one goes into the earliest wave holding no system it conflicts with,
//! creating a new wave when none qualifies. A system with no conflicts
//! therefore lands in the first wave, and among non-conflicting systems
//! lower priority numbers are never placed later. A system may land in an
//! earlier wave than a higher-priority system it conflicts with, as long as
//! that wave is free of conflicts.
//!
//! A universal access (exclusive, or declared with no components) conflicts
//! with everything and therefore sits alone in its wave. A plan made only of
//! such systems is simply serial.

use harbor_component::AccessMask;

/// What the resolver needs to know about each system.
#[derive(Debug, Clone, Copy)]
pub struct PlanInput {
    /// Tie-breaker; lower runs earlier.
    pub priority: i32,
    /// Resolved access.
    pub access: AccessMask,
}

/// A group of systems that can run in parallel (no conflicts).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wave {
    /// Indices into the planned system list, in priority order.
    pub system_indices: Vec<usize>,
}

/// Ordered list of waves covering every planned system exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WavePlan {
    /// Waves in execution order.
    pub waves: Vec<Wave>,
}

impl WavePlan {
    /// Number of waves.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waves.len()
    }

    /// Returns `true` if there is nothing to run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }

    /// Wave index of the system at `system_index`.
    #[must_use]
    pub fn wave_of(&self, system_index: usize) -> Option<usize> {
        self.waves
            .iter()
            .position(|wave| wave.system_indices.contains(&system_index))
    }
}

/// Computes the wave plan for a set of systems.
///
/// `systems[i]` is identified by `i` in the returned plan.
#[must_use]
pub fn compute_waves(systems: &[PlanInput]) -> WavePlan {
    let mut order: Vec<usize> = (0..systems.len()).collect();
    // Stable sort keeps registration order among equal priorities.
    order.sort_by_key(|&idx| systems[idx].priority);

    let mut waves: Vec<Wave> = Vec::new();

    for sys_idx in order {
        let access = &systems[sys_idx].access;

        let fits = waves.iter().position(|wave| {
            !wave
                .system_indices
                .iter()
                .any(|&other| access.conflicts_with(&systems[other].access))
        });

        match fits {
            Some(wave_idx) => waves[wave_idx].system_indices.push(sys_idx),
            None => waves.push(Wave {
                system_indices: vec![sys_idx],
            }),
        }
    }

    WavePlan { waves }
}

#[cfg(test)]
mod tests {
    use harbor_component::{AccessMode, ComponentMask, ComponentTypeId};

    use super::*;

    const TRANSFORM: u32 = 1;
    const VELOCITY: u32 = 2;
    const AI_STATE: u32 = 3;
    const POSITION: u32 = 4;

    fn make_system(priority: i32, reads: &[u32], writes: &[u32]) -> PlanInput {
        PlanInput {
            priority,
            access: AccessMask::new(
                reads.iter().copied().map(ComponentTypeId).collect(),
                writes.iter().copied().map(ComponentTypeId).collect(),
            ),
        }
    }

    fn with_mode(mode: AccessMode, priority: i32) -> PlanInput {
        PlanInput {
            priority,
            access: AccessMask {
                reads: ComponentMask::EMPTY,
                writes: ComponentMask::EMPTY,
                mode,
            },
        }
    }

    fn assert_valid(systems: &[PlanInput], plan: &WavePlan) {
        let mut seen = vec![0; systems.len()];
        for wave in &plan.waves {
            for (i, &a) in wave.system_indices.iter().enumerate() {
                seen[a] += 1;
                for &b in &wave.system_indices[i + 1..] {
                    assert!(
                        !systems[a].access.conflicts_with(&systems[b].access),
                        "systems {a} and {b} conflict but share a wave"
                    );
                }
            }
        }
        assert!(seen.iter().all(|&n| n == 1), "every system planned once");
    }

    #[test]
    fn test_no_systems_no_waves() {
        let plan = compute_waves(&[]);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_single_system_one_wave() {
        let systems = vec![make_system(0, &[TRANSFORM], &[VELOCITY])];
        let plan = compute_waves(&systems);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.waves[0].system_indices, vec![0]);
    }

    #[test]
    fn test_non_conflicting_systems_same_wave() {
        let systems = vec![
            make_system(0, &[TRANSFORM], &[VELOCITY]),
            make_system(0, &[TRANSFORM], &[AI_STATE]),
        ];
        let plan = compute_waves(&systems);
        assert_eq!(plan.len(), 1, "non-conflicting systems should share a wave");
        assert_eq!(plan.waves[0].system_indices.len(), 2);
    }

    #[test]
    fn test_conflicting_systems_different_waves() {
        let systems = vec![
            make_system(0, &[TRANSFORM], &[VELOCITY]),
            make_system(0, &[VELOCITY], &[TRANSFORM]),
        ];
        let plan = compute_waves(&systems);
        assert_eq!(plan.len(), 2, "conflicting systems must be in separate waves");
    }

    #[test]
    fn test_physics_ai_movement_waves() {
        // Physics: reads Transform, writes Velocity
        // AI: reads Transform, writes AiState
        // Movement: reads Velocity, writes Transform
        let systems = vec![
            make_system(0, &[TRANSFORM], &[VELOCITY]),
            make_system(1, &[TRANSFORM], &[AI_STATE]),
            make_system(2, &[VELOCITY], &[TRANSFORM]),
        ];
        let plan = compute_waves(&systems);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.waves[0].system_indices, vec![0, 1]);
        assert_eq!(plan.waves[1].system_indices, vec![2]);
        assert_eq!(plan.wave_of(2), Some(1));
    }

    #[test]
    fn test_priority_orders_conflicting_systems() {
        // Registered in reverse priority order.
        let systems = vec![
            make_system(20, &[], &[POSITION]),
            make_system(10, &[], &[POSITION]),
        ];
        let plan = compute_waves(&systems);
        assert_eq!(plan.waves[0].system_indices, vec![1]);
        assert_eq!(plan.waves[1].system_indices, vec![0]);
    }

    #[test]
    fn test_equal_priority_keeps_registration_order() {
        let systems = vec![
            make_system(0, &[], &[POSITION]),
            make_system(0, &[], &[POSITION]),
        ];
        let plan = compute_waves(&systems);
        assert_eq!(plan.waves[0].system_indices, vec![0]);
        assert_eq!(plan.waves[1].system_indices, vec![1]);
    }

    #[test]
    fn test_system_takes_earliest_conflict_free_wave() {
        // A conflicts with X; B conflicts with A only, so B fits beside X.
        let systems = vec![
            make_system(0, &[], &[VELOCITY]),         // X
            make_system(1, &[VELOCITY], &[POSITION]), // A
            make_system(2, &[POSITION], &[AI_STATE]), // B
        ];
        let plan = compute_waves(&systems);
        assert_valid(&systems, &plan);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.waves[0].system_indices, vec![0, 2]);
        assert_eq!(plan.waves[1].system_indices, vec![1]);
        assert_eq!(plan.wave_of(2), Some(0));
    }

    #[test]
    fn test_gap_in_earlier_wave_is_filled() {
        // Y and Z both conflict with X only; they share wave 1 instead of
        // Z opening a third wave. W conflicts with Y only and fits beside X.
        let systems = vec![
            make_system(0, &[], &[POSITION]),          // X
            make_system(1, &[POSITION], &[VELOCITY]),  // Y
            make_system(2, &[POSITION], &[TRANSFORM]), // Z
            make_system(3, &[VELOCITY], &[AI_STATE]),  // W
        ];
        let plan = compute_waves(&systems);
        assert_valid(&systems, &plan);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.waves[0].system_indices, vec![0, 3]);
        assert_eq!(plan.waves[1].system_indices, vec![1, 2]);
    }

    #[test]
    fn test_position_writers_never_share_a_wave() {
        // Every registration order of three Position writers and a reader.
        let base = vec![
            make_system(0, &[], &[POSITION]),
            make_system(0, &[VELOCITY], &[POSITION]),
            make_system(0, &[POSITION], &[]),
            make_system(0, &[TRANSFORM], &[POSITION, AI_STATE]),
        ];
        let orders: [[usize; 4]; 6] = [
            [0, 1, 2, 3],
            [3, 2, 1, 0],
            [1, 3, 0, 2],
            [2, 0, 3, 1],
            [0, 2, 1, 3],
            [3, 1, 2, 0],
        ];
        for order in orders {
            let systems: Vec<PlanInput> = order.iter().map(|&i| base[i]).collect();
            let plan = compute_waves(&systems);
            assert_valid(&systems, &plan);
            assert_eq!(plan.len(), 4);
        }
    }

    #[test]
    fn test_shared_readers_share_a_wave() {
        let systems = vec![
            make_system(0, &[POSITION], &[VELOCITY]),
            make_system(5, &[POSITION], &[AI_STATE]),
            make_system(9, &[POSITION], &[]),
        ];
        let plan = compute_waves(&systems);
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_universal_access_runs_alone() {
        let systems = vec![
            make_system(0, &[POSITION], &[]),
            with_mode(AccessMode::Declared, 1),
            make_system(2, &[VELOCITY], &[]),
            with_mode(AccessMode::Exclusive, 3),
        ];
        let plan = compute_waves(&systems);
        assert_valid(&systems, &plan);
        // The plain reader slots in beside the first one; universals stay alone.
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.waves[0].system_indices, vec![0, 2]);
        assert_eq!(plan.waves[1].system_indices, vec![1]);
        assert_eq!(plan.waves[2].system_indices, vec![3]);
    }

    #[test]
    fn test_all_universal_is_serial() {
        let systems: Vec<PlanInput> = (0..5)
            .map(|p| with_mode(AccessMode::Exclusive, p))
            .collect();
        let plan = compute_waves(&systems);
        assert_eq!(plan.len(), 5);
        assert!(plan.waves.iter().all(|wave| wave.system_indices.len() == 1));
    }

    #[test]
    fn test_commutative_joins_first_wave() {
        let systems = vec![
            make_system(0, &[], &[POSITION]),
            make_system(1, &[POSITION], &[VELOCITY]),
            with_mode(AccessMode::Commutative, 2),
        ];
        let plan = compute_waves(&systems);
        assert_eq!(plan.waves[0].system_indices, vec![0, 2]);
        assert_eq!(plan.waves[1].system_indices, vec![1]);
    }
}
