/// Split shard indexes `0..total` across `instances` executors.
///
/// Each executor gets a contiguous block of `total / instances` indexes; the
/// `total % instances` leftover indexes go one each to the first executors,
/// appended after their block. 10 over 3 gives `[[0,1,2,9],[3,4,5],[6,7,8]]`.
/// With fewer tokens than executors the trailing lists are empty.
pub fn sharding(total: usize, instances: usize) -> Vec<Vec<usize>> {
    if instances == 0 {
        return Vec::new();
    }
    let entropy = total / instances;
    let remainder = total % instances;
    (0..instances)
        .map(|i| {
            let mut shard: Vec<usize> = (i * entropy..(i + 1) * entropy).collect();
            if i < remainder {
                shard.push(entropy * instances + i);
            }
            shard
        })
        .collect()
}
