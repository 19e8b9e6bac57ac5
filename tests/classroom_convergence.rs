use sirtools::classroom::{empirical_frequencies, total_variation_distance};
use sirtools::ClassroomModel;

fn mean_distance(trials: u64, seeds: &[u64]) -> f64 {
    let model = ClassroomModel::new(20, 0.02, trials).unwrap();
    let exact = model.exact_pmf();
    let total: f64 = seeds.iter().map(|seed| {
        let counts = model.monte_carlo_counts(*seed).unwrap();
        total_variation_distance(&exact, &empirical_frequencies(&counts))
    }).sum();
    total / seeds.len() as f64
}

#[test]
fn empirical_distribution_converges_to_exact() {
    let distances = vec![
        mean_distance(1_000, &[1, 2, 3, 4, 5, 6, 7, 8]),
        mean_distance(10_000, &[1, 2, 3, 4, 5, 6, 7, 8]),
        mean_distance(100_000, &[1, 2, 3, 4]),
        mean_distance(1_000_000, &[1]),
    ];
    for pair in distances.windows(2) {
        assert!(pair[1] < pair[0], "distances {:?}", distances);
    }
    assert!(distances[3] < 0.005, "distances {:?}", distances);
}

#[test]
fn exact_classroom_figures() {
    let dist = ClassroomModel::new(20, 0.02, 1_000).unwrap().distribution(0).unwrap();
    assert!((dist.probability_none - 0.6676).abs() < 1e-3);
    assert!((dist.probability_any - 0.3324).abs() < 1e-3);
    assert!((dist.expected_infections - 0.4).abs() < 1e-12);
    assert!((dist.variance - 0.392).abs() < 1e-12);
    assert_eq!(dist.most_likely, 0);
}
