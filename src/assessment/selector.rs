//! 难度选择：在 [1,5] 上做二分式折半
//!
//! 区间 [lo,hi] 由历史回放得到：答对难度 d 则 lo=max(lo,d)，答错则 hi=min(hi,d)，部分正确不收缩。
//! 区间收敛（lo==hi）后一直给出该等级。中点等于上一轮难度时 ±1 扰动：答对或答错后总是扰动，
//! 不重复刚判定过的难度；部分正确只在区间未收缩时扰动，避免停滞。

use serde::Serialize;

use crate::assessment::types::{Correctness, LevelEstimate, QaPair, SkillLevel};

/// 二分搜索区间，始终满足 lo <= hi
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchInterval {
    pub lo: SkillLevel,
    pub hi: SkillLevel,
}

impl SearchInterval {
    pub fn full() -> Self {
        Self {
            lo: SkillLevel::MIN,
            hi: SkillLevel::MAX,
        }
    }

    pub fn is_converged(&self) -> bool {
        self.lo == self.hi
    }

    pub fn width(&self) -> u8 {
        self.hi.get() - self.lo.get()
    }

    /// round((lo+hi)/2)，.5 向上取整
    pub fn midpoint(&self) -> SkillLevel {
        SkillLevel::from_estimate((self.lo.as_f64() + self.hi.as_f64()) / 2.0)
    }

    /// 根据难度 d 上的判定收缩区间；结果宽度不增且不为空
    pub fn narrow(self, difficulty: SkillLevel, correctness: Correctness) -> Self {
        match correctness {
            Correctness::Correct => Self {
                lo: self.lo.max(difficulty).min(self.hi),
                hi: self.hi,
            },
            Correctness::Incorrect => Self {
                lo: self.lo,
                hi: self.hi.min(difficulty).max(self.lo),
            },
            Correctness::Partial => self,
        }
    }

    /// 从完整区间开始回放整段历史
    pub fn replay(history: &[QaPair]) -> Self {
        history.iter().fold(Self::full(), |interval, qa| {
            interval.narrow(qa.difficulty, qa.judgment.correctness)
        })
    }
}

impl Default for SearchInterval {
    fn default() -> Self {
        Self::full()
    }
}

/// 难度选择器（纯函数，不挂起）
#[derive(Debug, Clone, Copy, Default)]
pub struct DifficultySelector;

impl DifficultySelector {
    pub fn new() -> Self {
        Self
    }

    pub fn select(&self, estimate: &LevelEstimate, history: &[QaPair]) -> SkillLevel {
        let Some((last, earlier)) = history.split_last() else {
            return SearchInterval::full().midpoint();
        };

        let before = SearchInterval::replay(earlier);
        let after = before.narrow(last.difficulty, last.judgment.correctness);

        if after.is_converged() {
            return after.lo;
        }

        let proposal = after.midpoint();
        let decisive = last.judgment.correctness != Correctness::Partial;
        if proposal == last.difficulty && (decisive || before == after) {
            let step = Self::perturb_direction(estimate, last, &after);
            let perturbed = proposal.offset(step);
            tracing::debug!(
                "difficulty {} stalled, perturbing to {}",
                proposal,
                perturbed
            );
            return perturbed;
        }

        proposal
    }

    /// 答对往上探、答错往下探；部分正确时朝运行估计方向，平局时朝区间较宽一侧
    fn perturb_direction(estimate: &LevelEstimate, last: &QaPair, interval: &SearchInterval) -> i8 {
        match last.judgment.correctness {
            Correctness::Correct => 1,
            Correctness::Incorrect => -1,
            Correctness::Partial => {
                let d = last.difficulty.as_f64();
                if estimate.value < d {
                    -1
                } else if estimate.value > d {
                    1
                } else if interval.hi.get() - last.difficulty.get()
                    >= last.difficulty.get() - interval.lo.get()
                {
                    1
                } else {
                    -1
                }
            }
        }
    }
}
