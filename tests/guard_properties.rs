//! Model-based check of the guard bookkeeping: random sequences of single-thread operations on
//! a handful of guard slots, compared after every step with what the slots say is held.

use proptest::prelude::*;
use ticket_locks::{GuardedResource, ReadGuard, WriteGuard};

#[derive(Debug, Clone)]
enum Op {
    TryRead(usize),
    TryWrite(usize),
    Unlock(usize),
    CloneRead { from: usize, to: usize },
    Take { from: usize, to: usize },
}

const SLOTS: usize = 4;

fn arb_op() -> impl Strategy<Value = Op> {
    let slot = 0..SLOTS;
    prop_oneof![
        slot.clone().prop_map(Op::TryRead),
        slot.clone().prop_map(Op::TryWrite),
        slot.clone().prop_map(Op::Unlock),
        (slot.clone(), slot.clone()).prop_map(|(from, to)| Op::CloneRead { from, to }),
        (slot.clone(), slot).prop_map(|(from, to)| Op::Take { from, to }),
    ]
}

enum Slot<'a> {
    Empty,
    Read(ReadGuard<'a, u32>),
    Write(WriteGuard<'a, u32>),
}

impl Slot<'_> {
    fn is_bound(&self) -> bool {
        match self {
            Slot::Empty => false,
            Slot::Read(g) => g.is_locked(),
            Slot::Write(g) => g.is_locked(),
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn counters_follow_the_guards(ops in proptest::collection::vec(arb_op(), 1..64)) {
        let resource = GuardedResource::new(0u32);
        let mut slots: Vec<Slot<'_>> = (0..SLOTS).map(|_| Slot::Empty).collect();

        for op in ops {
            match op {
                Op::TryRead(i) => {
                    // the old binding goes away first, as with try_lock
                    slots[i] = Slot::Empty;
                    let writer_alive = slots.iter().any(|s| matches!(s, Slot::Write(g) if g.is_locked()));
                    let g = resource.try_read();
                    prop_assert_eq!(g.is_locked(), !writer_alive);
                    slots[i] = Slot::Read(g);
                }
                Op::TryWrite(i) => {
                    slots[i] = Slot::Empty;
                    let others = slots.iter().any(Slot::is_bound);
                    let g = resource.try_write();
                    prop_assert_eq!(g.is_locked(), !others);
                    slots[i] = Slot::Write(g);
                }
                Op::Unlock(i) => match &mut slots[i] {
                    Slot::Read(g) if g.is_locked() => g.unlock(),
                    Slot::Write(g) if g.is_locked() => g.unlock(),
                    _ => {}
                },
                Op::CloneRead { from, to } => {
                    let copy = match &slots[from] {
                        Slot::Read(g) => Some(g.clone()),
                        _ => None,
                    };
                    if let Some(copy) = copy {
                        slots[to] = Slot::Read(copy);
                    }
                }
                Op::Take { from, to } => {
                    let taken = match &mut slots[from] {
                        Slot::Read(g) => Slot::Read(g.take()),
                        Slot::Write(g) => Slot::Write(g.take()),
                        Slot::Empty => Slot::Empty,
                    };
                    slots[to] = taken;
                }
            }

            let readers = slots.iter().filter(|s| matches!(s, Slot::Read(g) if g.is_locked())).count();
            let writers = slots.iter().filter(|s| matches!(s, Slot::Write(g) if g.is_locked())).count();
            prop_assert_eq!(resource.readers(), readers);
            prop_assert_eq!(resource.is_write_locked(), writers == 1);
            prop_assert!(writers <= 1);
            prop_assert!(writers == 0 || readers == 0);
            prop_assert!(!resource.reserved());
        }

        drop(slots);
        prop_assert!(!resource.is_locked());
    }
}
