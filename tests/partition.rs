use anyhow::Result;
use ironshard::{Partitioner, ShardIds};
use std::collections::HashSet;

#[test]
fn owner_is_ordinal_mod_workers() -> Result<()> {
    let p = Partitioner::new(4)?;
    let owners: Vec<usize> = (0..9).map(|i| p.owner(i)).collect();
    assert_eq!(owners, vec![0, 1, 2, 3, 0, 1, 2, 3, 0]);
    Ok(())
}

#[test]
fn every_record_has_exactly_one_owner() -> Result<()> {
    let p = Partitioner::new(3)?;
    for ordinal in 0..100 {
        let owners = p.assignments().filter(|a| a.owns(ordinal)).count();
        assert_eq!(owners, 1, "ordinal {ordinal}");
    }
    Ok(())
}

#[test]
fn single_worker_owns_everything() -> Result<()> {
    let a = Partitioner::new(1)?.assignment(0)?;
    assert!((0..50).all(|i| a.owns(i)));
    Ok(())
}

#[test]
fn invalid_worker_counts_are_rejected() -> Result<()> {
    assert!(Partitioner::new(0).is_err());
    assert!(Partitioner::new(2)?.assignment(2).is_err());
    Ok(())
}

#[test]
fn strided_ids_never_collide_across_workers() -> Result<()> {
    let p = Partitioner::new(5)?;
    let mut seen = HashSet::new();
    for a in p.assignments() {
        let mut ids = a.shard_ids();
        for _ in 0..20 {
            assert!(seen.insert(ids.next_id()));
        }
    }
    assert_eq!(seen.len(), 100);
    Ok(())
}

#[test]
fn strided_sequence_for_a_worker() -> Result<()> {
    let mut ids = Partitioner::new(3)?.assignment(1)?.shard_ids();
    let got: Vec<u64> = (0..4).map(|_| ids.next_id()).collect();
    assert_eq!(got, vec![1, 4, 7, 10]);

    let mut seq = ShardIds::sequential();
    assert_eq!((seq.next_id(), seq.next_id()), (0, 1));
    Ok(())
}

#[test]
fn shared_counter_is_unique_across_threads() {
    let ids = ShardIds::shared();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let mut ids = ids.clone();
            std::thread::spawn(move || (0..250).map(|_| ids.next_id()).collect::<Vec<_>>())
        })
        .collect();
    let mut all: Vec<u64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
    all.sort_unstable();
    assert_eq!(all, (0..1000).collect::<Vec<u64>>());
}
