use proptest::prelude::*;
use std::collections::BTreeSet;
use zeppelin_core::{
    ActivityEntry, Diff, Node, NodeState, NodeType, Snapshot, StateStore, ACTIVITY_CAPACITY,
};

#[derive(Debug, Clone)]
enum Step {
    Add(u8),
    Remove(u8),
    AddAndRemove(u8),
}

fn node_id(idx: u8) -> String {
    format!("rig/polecats/p{idx}")
}

fn polecat(idx: u8) -> Node {
    Node::new(node_id(idx), NodeType::Polecat, NodeState::Idle).with_rig("rig")
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0u8..8).prop_map(Step::Add),
        (0u8..8).prop_map(Step::Remove),
        (0u8..8).prop_map(Step::AddAndRemove),
    ]
}

fn diff_for(step: &Step) -> Diff {
    match step {
        Step::Add(idx) => Diff {
            nodes_added: vec![polecat(*idx)],
            ..Diff::default()
        },
        Step::Remove(idx) => Diff {
            nodes_removed: vec![node_id(*idx)],
            ..Diff::default()
        },
        Step::AddAndRemove(idx) => Diff {
            nodes_removed: vec![node_id(*idx)],
            nodes_added: vec![polecat(*idx)],
            ..Diff::default()
        },
    }
}

proptest! {
    #[test]
    fn node_ids_track_adds_and_removes_in_arrival_order(
        initial in proptest::collection::btree_set(0u8..8, 0..6),
        steps in proptest::collection::vec(step_strategy(), 0..40),
    ) {
        let mut store = StateStore::new();
        store.apply_snapshot(Snapshot {
            nodes: initial.iter().copied().map(polecat).collect(),
            ..Snapshot::default()
        });

        let mut expected: BTreeSet<String> = initial.iter().copied().map(node_id).collect();
        for step in &steps {
            store.apply_diff(diff_for(step));
            match step {
                Step::Add(idx) | Step::AddAndRemove(idx) => {
                    expected.insert(node_id(*idx));
                }
                Step::Remove(idx) => {
                    expected.remove(&node_id(*idx));
                }
            }
        }

        let actual: BTreeSet<String> = store.nodes().iter().map(|n| n.id.clone()).collect();
        prop_assert_eq!(actual, expected);
        prop_assert_eq!(store.nodes().len(), store.node_ids().len());
    }

    #[test]
    fn activity_is_capped_to_most_recent_entries(
        initial in 0usize..150,
        batches in proptest::collection::vec(0usize..60, 0..8),
    ) {
        let mut counter = 0usize;
        let mut next = |count: usize| -> Vec<ActivityEntry> {
            (0..count)
                .map(|_| {
                    counter += 1;
                    ActivityEntry::new(format!("e{counter}"))
                })
                .collect()
        };

        let mut store = StateStore::new();
        let mut all = next(initial);
        store.apply_snapshot(Snapshot {
            activity: all.clone(),
            ..Snapshot::default()
        });
        for batch in batches {
            let appended = next(batch);
            all.extend(appended.iter().cloned());
            store.apply_diff(Diff {
                activity_append: appended,
                ..Diff::default()
            });
            prop_assert!(store.activity().len() <= ACTIVITY_CAPACITY);
        }

        let expected = &all[all.len().saturating_sub(ACTIVITY_CAPACITY)..];
        prop_assert_eq!(store.activity(), expected);
    }
}

#[test]
fn interleaved_add_remove_of_same_id_is_order_dependent() {
    let add = Diff {
        nodes_added: vec![polecat(1)],
        ..Diff::default()
    };
    let remove = Diff {
        nodes_removed: vec![node_id(1)],
        ..Diff::default()
    };

    let mut forward = StateStore::new();
    forward.apply_snapshot(Snapshot::default());
    forward.apply_diff(add.clone());
    forward.apply_diff(remove.clone());

    let mut reversed = StateStore::new();
    reversed.apply_snapshot(Snapshot::default());
    reversed.apply_diff(remove);
    reversed.apply_diff(add);

    assert!(forward.node(&node_id(1)).is_none());
    assert!(reversed.node(&node_id(1)).is_some());
}
