//! Property-based tests for the bounded FIFO `Window` (spec §4.C7 step 6).

use mw_model::Window;
use proptest::prelude::*;

proptest! {
    // Never holds more than `capacity` entries, for any push sequence.
    #[test]
    fn never_exceeds_capacity(capacity in 1usize..20, pushes in 0usize..200) {
        let mut w: Window<usize> = Window::new(capacity);
        for i in 0..pushes {
            w.push(i);
            prop_assert!(w.len() <= capacity);
        }
    }

    // Oldest-first eviction: the values returned by consecutive pushes past
    // capacity, interleaved with the final drain, form the full input
    // sequence in order.
    #[test]
    fn fifo_order_is_preserved(capacity in 1usize..10, pushes in 1usize..50) {
        let mut w: Window<usize> = Window::new(capacity);
        let mut observed = Vec::new();
        for i in 0..pushes {
            if let Some(evicted) = w.push(i) {
                observed.push(evicted);
            }
        }
        while let Some(remaining) = w.pop_oldest() {
            observed.push(remaining);
        }
        let expected: Vec<usize> = (0..pushes).collect();
        prop_assert_eq!(observed, expected);
    }
}
