//! Traffic-class share normalization.
//!
//! Each VF asks for a percentage of every traffic class. The NIC needs the
//! shares of a class to add up to 100, so requests that over or under
//! subscribe a class are scaled before being programmed.

use crate::model::{PortState, MAX_TCS, MAX_VFS};

/// Normalized shares laid out `vf_slot * ntcs + tc`.
pub type TcShares = [u8; MAX_VFS * MAX_TCS];

/// What to do with the percentage points lost to integer truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QosPolicy {
    /// Drop them; a scaled class may total slightly less than 100.
    #[default]
    Truncate,
    /// Hand them out one point at a time, largest remainder first.
    LargestRemainder,
}

/// Computes normalized shares for every active VF on `port`.
///
/// For each class the shares of active VFs are summed. A sum of exactly
/// 100 is copied as is, a sum of 0 stays 0, and any other sum has every
/// share rescaled to `share * 100 / sum`. Free slots are always 0.
pub fn normalize(port: &PortState, policy: QosPolicy) -> TcShares {
    let mut out = [0u8; MAX_VFS * MAX_TCS];
    let ntcs = usize::from(port.ntcs).min(MAX_TCS);

    for tc in 0..ntcs {
        let sum: u32 = port
            .active_vfs()
            .map(|vf| u32::from(vf.tc_pctgs[tc]))
            .sum();
        if sum == 0 {
            continue;
        }

        let mut remainders = Vec::new();
        let mut total = 0u32;
        for (slot, vf) in port.slots().iter().enumerate() {
            if !vf.is_active() {
                continue;
            }
            let configured = u32::from(vf.tc_pctgs[tc]);
            let share = if sum == 100 {
                configured
            } else {
                configured * 100 / sum
            };
            out[slot * ntcs + tc] = share as u8;
            total += share;
            if sum != 100 && configured > 0 {
                remainders.push((configured * 100 % sum, slot));
            }
        }

        if policy == QosPolicy::LargestRemainder && total < 100 {
            remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
            for (_, slot) in remainders.iter().take((100 - total) as usize) {
                out[slot * ntcs + tc] += 1;
            }
        }
    }

    out
}

/// Sum of class `tc` across every slot.
pub fn class_total(shares: &TcShares, ntcs: u8, tc: usize) -> u32 {
    let ntcs = usize::from(ntcs).min(MAX_TCS);
    (0..MAX_VFS).map(|slot| u32::from(shares[slot * ntcs + tc])).sum()
}
