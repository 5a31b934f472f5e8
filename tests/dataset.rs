use gridnet::{Dataset, Entry};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashSet;
use std::sync::Arc;

fn numbered(n: usize) -> Dataset {
    Dataset::from_entries(
        (0..n).map(|i| Entry::from_slices(&[i as f32], &[(2 * i) as f32]).unwrap()),
    )
    .unwrap()
}

fn ids(data: &Dataset) -> Vec<usize> {
    data.iter().map(|e| e.features[0] as usize).collect()
}

#[test]
fn test_train_test_split_80_20() {
    let data = numbered(100);
    let (train, test) = data.train_test_split(0.8).unwrap();
    assert_eq!(train.len(), 80);
    assert_eq!(test.len(), 20);

    let train_ids: HashSet<_> = ids(&train).into_iter().collect();
    let test_ids: HashSet<_> = ids(&test).into_iter().collect();
    assert_eq!(train_ids.len(), 80);
    assert!(train_ids.is_disjoint(&test_ids));
    assert_eq!(train_ids.union(&test_ids).count(), 100);
}

#[test]
fn test_split_floors_train_size() {
    let data = numbered(7);
    let (train, test) = data
        .train_test_split_with(&mut StdRng::seed_from_u64(0), 0.5)
        .unwrap();
    assert_eq!((train.len(), test.len()), (3, 4));
}

#[test]
fn test_random_batch_is_distinct() {
    let data = numbered(100);
    let batch = data.get_random_batch(10).unwrap();
    assert_eq!(batch.len(), 10);
    let unique: HashSet<_> = ids(&batch).into_iter().collect();
    assert_eq!(unique.len(), 10);
    for e in batch.iter() {
        assert_eq!(e.labels[0], 2.0 * e.features[0]);
    }
}

#[test]
fn test_random_batch_larger_than_dataset_is_fatal() {
    let data = numbered(100);
    let err = data.get_random_batch(101).unwrap_err();
    assert!(err.is_precondition());
    assert!(err.to_string().contains("dataset::get_random_batch"));
    assert_eq!(data.get_random_batch(100).unwrap().len(), 100);
}

#[test]
fn test_seeded_batches_repeat() {
    let data = numbered(50);
    let a = data.get_random_batch_with(&mut StdRng::seed_from_u64(8), 5).unwrap();
    let b = data.get_random_batch_with(&mut StdRng::seed_from_u64(8), 5).unwrap();
    assert_eq!(ids(&a), ids(&b));
}

#[test]
fn test_batches_cover_the_whole_dataset() {
    // the permutation must span every entry, not a fixed prefix
    let data = numbered(30);
    let mut rng = StdRng::seed_from_u64(21);
    let mut seen = HashSet::new();
    for _ in 0..200 {
        seen.extend(ids(&data.get_random_batch_with(&mut rng, 3).unwrap()));
    }
    assert_eq!(seen.len(), 30);
}

#[test]
fn test_get_and_index() {
    let data = numbered(3);
    assert_eq!(data.get(1).unwrap().labels[0], 2.0);
    assert!(data.get(3).is_none());
    assert_eq!(data[2].features[0], 2.0);
    assert_eq!((&data).into_iter().count(), 3);
}

#[test]
fn test_shared_entries_keep_identity() {
    let data = numbered(10);
    let (train, _) = data.train_test_split(0.5).unwrap();
    for e in train.entries() {
        assert!(data.entries().iter().any(|d| Arc::ptr_eq(d, e)));
    }
}
