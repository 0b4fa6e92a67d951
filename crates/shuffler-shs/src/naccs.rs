//! The equivalent-accelerator-count algorithm (§4.4.1) and the ready mask
//! it shares a scan with (§4.4.2).

use shuffler_hcs::Shadow;

/// Counts independent work-consuming units for kernel identity `k`: a TMR
/// group of three-or-more replicas counts once, a DMR group of two counts
/// once, a simplex slot counts once. Operates on a local copy of the
/// shadow — callers must not republish it afterwards.
pub fn equivalent_accelerator_count(shadow: &Shadow, n_slots: usize, k: u8) -> u32 {
    let mut scratch = *shadow;
    let mut count = 0u32;
    for i in 0..n_slots {
        if scratch.id_nibble(i) != k {
            continue;
        }
        let tmr = scratch.tmr_nibble(i);
        let dmr = scratch.dmr_nibble(i);
        if tmr != 0 {
            clear_matching(&mut scratch, n_slots, i, k, |s, j| s.tmr_nibble(j) == tmr);
        } else if dmr != 0 {
            clear_matching(&mut scratch, n_slots, i, k, |s, j| s.dmr_nibble(j) == dmr);
        }
        count += 1;
    }
    count
}

fn clear_matching(
    scratch: &mut Shadow,
    n_slots: usize,
    i: usize,
    k: u8,
    same_group: impl Fn(&Shadow, usize) -> bool,
) {
    for j in (i + 1)..n_slots {
        if scratch.id_nibble(j) == k && same_group(scratch, j) {
            scratch.set_id_nibble(j, 0);
        }
    }
}

/// Bit `i` set iff slot `i`'s id nibble equals `k` (§4.4.2). Feeds directly
/// into [`shuffler_hcs::Hcs::transfer_is_done`].
pub fn ready_mask(shadow: &Shadow, n_slots: usize, k: u8) -> u32 {
    let mut mask = 0u32;
    for i in 0..n_slots {
        if shadow.id_nibble(i) == k {
            mask |= 1 << i;
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simplex_slots_each_count_one() {
        let mut s = Shadow::default();
        s.set_id_nibble(0, 1);
        s.set_id_nibble(1, 1);
        s.set_id_nibble(2, 1);
        assert_eq!(equivalent_accelerator_count(&s, 4, 1), 3);
    }

    #[test]
    fn tmr_group_of_three_counts_as_one_unit() {
        let mut s = Shadow::default();
        for i in 0..3 {
            s.set_id_nibble(i, 1);
            s.set_tmr_nibble(i, 1);
        }
        s.set_id_nibble(3, 1); // simplex
        assert_eq!(equivalent_accelerator_count(&s, 4, 1), 2);
    }

    #[test]
    fn dmr_group_of_two_counts_as_one_unit() {
        let mut s = Shadow::default();
        s.set_id_nibble(0, 1);
        s.set_dmr_nibble(0, 5);
        s.set_id_nibble(1, 1);
        s.set_dmr_nibble(1, 5);
        assert_eq!(equivalent_accelerator_count(&s, 4, 1), 1);
    }

    #[test]
    fn unrelated_kernel_identities_are_ignored() {
        let mut s = Shadow::default();
        s.set_id_nibble(0, 2);
        assert_eq!(equivalent_accelerator_count(&s, 4, 1), 0);
    }

    #[test]
    fn distinct_tmr_group_ids_are_not_collapsed_together() {
        let mut s = Shadow::default();
        s.set_id_nibble(0, 1);
        s.set_tmr_nibble(0, 1);
        s.set_id_nibble(1, 1);
        s.set_tmr_nibble(1, 2);
        assert_eq!(equivalent_accelerator_count(&s, 4, 1), 2);
    }

    #[test]
    fn ready_mask_covers_every_replica_of_the_kernel() {
        let mut s = Shadow::default();
        s.set_id_nibble(0, 1);
        s.set_id_nibble(2, 1);
        assert_eq!(ready_mask(&s, 4, 1), 0b0101);
    }
}
