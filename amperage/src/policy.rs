//! Core selection policy
//!
//! Everything here is a pure function of the tunable snapshot and the observed
//! core state. The controller turns the resulting plans into platform calls.

use crate::error::{HotplugError, Result};
use crate::tunables::{Hz, RestoreMode, Tunables};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Observed state of one core at the start of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreView {
    pub index: usize,
    pub online: bool,
    pub frequency: Hz,
}

impl CoreView {
    /// Core 0 is always on and never touched
    pub fn is_managed(&self) -> bool {
        self.index != 0
    }
}

/// How a resume pass selects cores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ResumeStrategy {
    /// Online cores in index order until `target` cores are online
    Full { target: usize },
    /// Online the fastest cores at or above `threshold`, up to `target` online
    Threshold { target: usize, threshold: Hz },
}

impl ResumeStrategy {
    /// Strategy used when the tunables cannot be trusted
    pub fn fallback(total_cores: usize) -> Self {
        Self::Full {
            target: total_cores,
        }
    }

    pub fn target(&self) -> usize {
        match self {
            Self::Full { target } | Self::Threshold { target, .. } => *target,
        }
    }
}

impl fmt::Display for ResumeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full { target } => write!(f, "full restore to {} cores", target),
            Self::Threshold { target, threshold } => write!(
                f,
                "threshold restore to {} cores at >= {} Hz",
                target, threshold
            ),
        }
    }
}

/// Number of managed cores that may be onlined under powersave
///
/// `ceil((total - 1) * plug_percent / 100)`, clamped to
/// `[min_cores_online - 1, max_cores_online - 1]`.
pub fn eligible_core_count(total_cores: usize, tunables: &Tunables) -> usize {
    let managed = total_cores.saturating_sub(1);
    let scaled = (managed * tunables.plug_percent as usize).div_ceil(100);
    let floor = tunables.min_cores_online.saturating_sub(1);
    let ceiling = tunables.max_cores_online.saturating_sub(1);
    scaled.max(floor).min(ceiling)
}

/// Pick the resume strategy for this snapshot
///
/// Fails with [`HotplugError::ConfigurationInconsistency`] when the snapshot
/// does not hold for `total_cores` (for example after the platform reported
/// fewer cores than the tunables were validated against).
pub fn resume_strategy(tunables: &Tunables, total_cores: usize) -> Result<ResumeStrategy> {
    if total_cores < 2 {
        return Err(HotplugError::ConfigurationInconsistency(format!(
            "{} cores reported, nothing to manage",
            total_cores
        )));
    }
    tunables
        .validate(total_cores)
        .map_err(|e| HotplugError::ConfigurationInconsistency(e.to_string()))?;

    if !tunables.powersave_enabled {
        return Ok(ResumeStrategy::Full {
            target: tunables.max_cores_online,
        });
    }

    let target = 1 + eligible_core_count(total_cores, tunables);
    Ok(match tunables.restore_mode {
        RestoreMode::FullRestore => ResumeStrategy::Full { target },
        RestoreMode::ThresholdRestore => ResumeStrategy::Threshold {
            target,
            threshold: tunables.plugging_threshold,
        },
    })
}

/// Managed cores to offline on suspend, descending
pub fn plan_suspend(cores: &[CoreView]) -> Vec<usize> {
    let mut plan: Vec<usize> = cores
        .iter()
        .filter(|c| c.is_managed() && c.online)
        .map(|c| c.index)
        .collect();
    plan.sort_unstable_by(|a, b| b.cmp(a));
    plan
}

/// Managed cores to online on resume, ascending
///
/// Cores already online count towards the target and are never touched. If
/// the selection leaves fewer than `min_online` cores online, the lowest
/// remaining offline cores are added until the floor is met.
pub fn plan_resume(cores: &[CoreView], strategy: ResumeStrategy, min_online: usize) -> Vec<usize> {
    let online = cores.iter().filter(|c| c.online).count();
    let offline: Vec<&CoreView> = {
        let mut offline: Vec<&CoreView> = cores
            .iter()
            .filter(|c| c.is_managed() && !c.online)
            .collect();
        offline.sort_by_key(|c| c.index);
        offline
    };
    let budget = strategy.target().saturating_sub(online);

    let mut chosen: Vec<usize> = match strategy {
        ResumeStrategy::Full { .. } => offline.iter().take(budget).map(|c| c.index).collect(),
        ResumeStrategy::Threshold { threshold, .. } => {
            let mut candidates: Vec<&&CoreView> =
                offline.iter().filter(|c| c.frequency >= threshold).collect();
            candidates.sort_by(|a, b| b.frequency.cmp(&a.frequency).then(a.index.cmp(&b.index)));
            candidates.into_iter().take(budget).map(|c| c.index).collect()
        }
    };

    let shortfall = min_online.saturating_sub(online + chosen.len());
    if shortfall > 0 {
        let extra: Vec<usize> = offline
            .iter()
            .map(|c| c.index)
            .filter(|index| !chosen.contains(index))
            .take(shortfall)
            .collect();
        chosen.extend(extra);
    }

    chosen.sort_unstable();
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tunables(min: usize, max: usize, percent: u8) -> Tunables {
        Tunables {
            min_cores_online: min,
            max_cores_online: max,
            plug_percent: percent,
            plugging_threshold: 1_497_000,
            powersave_enabled: true,
            restore_mode: RestoreMode::FullRestore,
        }
    }

    fn offline_cores(freqs: &[Hz]) -> Vec<CoreView> {
        let mut cores = vec![CoreView {
            index: 0,
            online: true,
            frequency: 0,
        }];
        cores.extend(freqs.iter().enumerate().map(|(i, &frequency)| CoreView {
            index: i + 1,
            online: false,
            frequency,
        }));
        cores
    }

    #[test]
    fn test_eligible_count_formula() {
        assert_eq!(eligible_core_count(4, &tunables(1, 4, 100)), 3);
        assert_eq!(eligible_core_count(4, &tunables(1, 4, 25)), 1);
        assert_eq!(eligible_core_count(8, &tunables(1, 8, 50)), 4);
        assert_eq!(eligible_core_count(8, &tunables(1, 8, 10)), 1);
    }

    #[test]
    fn test_eligible_count_clamped() {
        // Floor from min_cores_online
        assert_eq!(eligible_core_count(4, &tunables(3, 4, 25)), 2);
        // Ceiling from max_cores_online
        assert_eq!(eligible_core_count(8, &tunables(1, 3, 100)), 2);
    }

    #[test]
    fn test_strategy_without_powersave_ignores_restore_mode() {
        let mut t = tunables(1, 3, 25);
        t.powersave_enabled = false;
        t.restore_mode = RestoreMode::ThresholdRestore;
        assert_eq!(resume_strategy(&t, 4).unwrap(), ResumeStrategy::Full { target: 3 });
    }

    #[test]
    fn test_strategy_with_powersave() {
        let mut t = tunables(1, 4, 25);
        assert_eq!(resume_strategy(&t, 4).unwrap(), ResumeStrategy::Full { target: 2 });

        t.restore_mode = RestoreMode::ThresholdRestore;
        assert_eq!(
            resume_strategy(&t, 4).unwrap(),
            ResumeStrategy::Threshold {
                target: 2,
                threshold: 1_497_000
            }
        );
    }

    #[test]
    fn test_strategy_inconsistency() {
        let t = tunables(1, 8, 100);
        assert!(matches!(
            resume_strategy(&t, 4),
            Err(HotplugError::ConfigurationInconsistency(_))
        ));
        assert!(resume_strategy(&tunables(1, 1, 100), 1).is_err());
    }

    #[test]
    fn test_plan_suspend_descending() {
        let mut cores = offline_cores(&[0, 0, 0]);
        for core in cores.iter_mut() {
            core.online = true;
        }
        cores[2].online = false;
        assert_eq!(plan_suspend(&cores), vec![3, 1]);
    }

    #[test]
    fn test_plan_resume_full() {
        let cores = offline_cores(&[0, 0, 0]);
        assert_eq!(plan_resume(&cores, ResumeStrategy::Full { target: 4 }, 1), vec![1, 2, 3]);
        assert_eq!(plan_resume(&cores, ResumeStrategy::Full { target: 2 }, 1), vec![1]);
        assert!(plan_resume(&cores, ResumeStrategy::Full { target: 1 }, 1).is_empty());
    }

    #[test]
    fn test_plan_resume_threshold() {
        let cores = offline_cores(&[1_600_000, 1_200_000, 1_497_000]);
        let strategy = ResumeStrategy::Threshold {
            target: 4,
            threshold: 1_497_000,
        };
        assert_eq!(plan_resume(&cores, strategy, 1), vec![1, 3]);
    }

    #[test]
    fn test_plan_resume_threshold_ranks_by_frequency() {
        let cores = offline_cores(&[1_500_000, 1_200_000, 1_900_000]);
        let strategy = ResumeStrategy::Threshold {
            target: 2,
            threshold: 1_497_000,
        };
        assert_eq!(plan_resume(&cores, strategy, 1), vec![3]);
    }

    #[test]
    fn test_plan_resume_tops_up_to_floor() {
        let cores = offline_cores(&[100, 200, 300]);
        let strategy = ResumeStrategy::Threshold {
            target: 4,
            threshold: 1_000,
        };
        assert_eq!(plan_resume(&cores, strategy, 3), vec![1, 2]);
    }

    #[test]
    fn test_plan_resume_counts_online_cores() {
        let mut cores = offline_cores(&[0, 0, 0]);
        cores[2].online = true;
        assert_eq!(plan_resume(&cores, ResumeStrategy::Full { target: 3 }, 1), vec![1]);
    }
}
