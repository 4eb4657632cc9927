//! Deadlock-free protocol schedule.
//!
//! Links are grouped by their strongest junction (faces, then edges,
//! then corners) and packed greedily into rounds in which no partition
//! appears twice. Rounds run in a single global order; inside a round
//! each link exchanges twice, the lower rank sending first. Because both
//! ends of every link see the same order with opposite instructions, no
//! two partitions can ever both block waiting to receive from each other.

use std::collections::HashSet;

use partix_core::{ConfigError, PartitionId, RuleTag};
use partix_space::{Decomposition, JunctionKind, Link};

use crate::rule::CommRule;

/// Pack links into rounds of pairwise-disjoint links, largest round first.
pub fn schedule_rounds(links: &[Link]) -> Vec<Vec<Link>> {
    let mut rounds: Vec<Vec<Link>> = Vec::new();
    let mut current: Vec<Link> = Vec::new();
    let mut busy: HashSet<PartitionId> = HashSet::new();

    for kind in [JunctionKind::Surface, JunctionKind::Line, JunctionKind::Point] {
        let mut pending: Vec<Link> = links.iter().copied().filter(|l| l.kind == kind).collect();
        while !pending.is_empty() {
            match pending
                .iter()
                .position(|l| !busy.contains(&l.low) && !busy.contains(&l.high))
            {
                Some(i) => {
                    let link = pending.remove(i);
                    busy.insert(link.low);
                    busy.insert(link.high);
                    current.push(link);
                }
                None => {
                    // everyone left is busy
                    rounds.push(std::mem::take(&mut current));
                    busy.clear();
                }
            }
        }
    }
    if !current.is_empty() {
        rounds.push(current);
    }
    rounds.sort_by(|a, b| b.len().cmp(&a.len()));
    rounds
}

/// Ordered rules for every partition of `decomp`, indexed by rank.
///
/// Tags are assigned from 1 upward, two per link.
pub fn build_rules(decomp: &Decomposition) -> Result<Vec<Vec<CommRule>>, ConfigError> {
    let cells = decomp.cells();
    let mut rules: Vec<Vec<CommRule>> = vec![Vec::new(); cells.len()];
    let rounds = schedule_rounds(&decomp.links());
    let mut next_tag = 1u32;
    for round in &rounds {
        for link in round {
            let (lo, hi) = (link.low.0 as usize, link.high.0 as usize);
            let unknown = |index: usize| ConfigError::UnknownReference {
                what: "partition",
                index,
                len: cells.len(),
            };
            let lo_cell = cells.get(lo).ok_or_else(|| unknown(lo))?;
            let hi_cell = cells.get(hi).ok_or_else(|| unknown(hi))?;
            let lo_ch = lo_cell.channel_to(link.high).ok_or_else(|| unknown(hi))?;
            let hi_ch = hi_cell.channel_to(link.low).ok_or_else(|| unknown(lo))?;

            let first = RuleTag(next_tag);
            let second = RuleTag(next_tag + 1);
            next_tag += 2;
            rules[lo].push(CommRule::send(lo_ch, first));
            rules[hi].push(CommRule::recv(hi_ch, first));
            rules[hi].push(CommRule::send(hi_ch, second));
            rules[lo].push(CommRule::recv(lo_ch, second));
        }
    }
    log::info!(
        "scheduled {} links in {} rounds for {} partitions",
        rounds.iter().map(Vec::len).sum::<usize>(),
        rounds.len(),
        cells.len()
    );
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Instruction;
    use glam::DVec3;
    use partix_core::PeriodicBox;

    fn decomp(divs: [usize; 3]) -> Decomposition {
        Decomposition::uniform(PeriodicBox::new(DVec3::splat(12.0)).unwrap(), divs).unwrap()
    }

    #[test]
    fn rounds_are_disjoint() {
        let d = decomp([2, 2, 2]);
        for round in schedule_rounds(&d.links()) {
            let mut seen = HashSet::new();
            for l in &round {
                assert!(seen.insert(l.low));
                assert!(seen.insert(l.high));
            }
        }
    }

    #[test]
    fn rounds_sorted_largest_first() {
        let d = decomp([3, 3, 1]);
        let rounds = schedule_rounds(&d.links());
        assert!(rounds.windows(2).all(|w| w[0].len() >= w[1].len()));
        let total: usize = rounds.iter().map(Vec::len).sum();
        assert_eq!(total, d.links().len());
    }

    #[test]
    fn two_partitions_exchange_both_ways() {
        let d = decomp([2, 1, 1]);
        let rules = build_rules(&d).unwrap();
        assert_eq!(
            rules[0],
            vec![
                CommRule::send(partix_core::ChannelIndex(0), RuleTag(1)),
                CommRule::recv(partix_core::ChannelIndex(0), RuleTag(2)),
            ]
        );
        assert_eq!(rules[1][0].instruction, Instruction::Recv);
        assert_eq!(rules[1][1].instruction, Instruction::Send);
    }

    #[test]
    fn every_tag_pairs_a_send_with_a_recv() {
        let d = decomp([3, 2, 2]);
        let rules = build_rules(&d).unwrap();
        let mut sends = std::collections::HashMap::new();
        let mut recvs = std::collections::HashMap::new();
        for (rank, list) in rules.iter().enumerate() {
            for r in list {
                let peer = d.cells()[rank].neighbors[r.channel.index()];
                match r.instruction {
                    Instruction::Send => sends.insert(r.tag, (rank as u32, peer.0)),
                    Instruction::Recv => recvs.insert(r.tag, (peer.0, rank as u32)),
                };
            }
        }
        assert_eq!(sends, recvs);
    }
}
