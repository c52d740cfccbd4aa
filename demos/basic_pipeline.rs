//! Basic example demonstrating the community comparison pipeline.
//!
//! This example shows how to:
//! 1. Create synthetic data
//! 2. Profile sequencing depth and filter rare taxa
//! 3. Run the full two-group analysis
//! 4. Examine SIMPER and network results

use composable_community::prelude::*;
use sprs::TriMat;

fn main() -> Result<()> {
    println!("=== Composable Community Example ===\n");

    let (counts, metadata) = create_example_data();

    println!("Data dimensions:");
    println!("  Taxa:    {}", counts.n_taxa());
    println!("  Samples: {}", counts.n_samples());
    println!();

    println!("=== Data Profiling ===\n");
    print!("{}", profile_library_size(&counts));
    let (_, stats) = filter_relative_abundance_with_stats(&counts, 1e-3)?;
    print!("{}", stats);
    println!();

    println!("=== Running Pipeline ===\n");
    let analysis = Pipeline::new()
        .global_threshold(1e-3)
        .network_threshold(1e-3)
        .edge_thresholds(0.01, 0.6)
        .permutations(499)
        .run(&counts, &metadata)?;

    let perm = &analysis.permanova;
    println!(
        "PERMANOVA: F = {:.2}, R2 = {:.3}, p = {:.4}",
        perm.pseudo_f, perm.r_squared, perm.p_value
    );
    println!();

    println!(
        "SIMPER {} vs {} (mean dissimilarity {:.3}):",
        analysis.simper.group_a, analysis.simper.group_b, analysis.simper.overall_dissimilarity
    );
    for t in analysis.simper.taxa.iter().take(5) {
        println!(
            "  {}: avg={:.4}, cum={:.2}, q={:.4}",
            t.taxon_id,
            t.average,
            t.cumulative,
            analysis
                .simper_tests
                .iter()
                .find(|r| r.taxon_id == t.taxon_id)
                .map(|r| r.q_value)
                .unwrap_or(f64::NAN)
        );
    }
    if let Ok(rho) = analysis.simper.abundance_rank_correlation() {
        println!("  contribution vs abundance rank correlation: {:.2}", rho);
    }
    println!();

    println!("=== Networks ===\n");
    for (label, group) in &analysis.groups {
        println!(
            "{}: {} nodes, {} edges, top degree {:?}",
            label,
            group.network.n_nodes(),
            group.network.n_edges(),
            top_degree(&group.network, 3)
        );
    }

    Ok(())
}

fn create_example_data() -> (CountMatrix, Metadata) {
    let n_taxa = 30;
    let n_samples = 20;
    let mut tri_mat = TriMat::new((n_taxa, n_samples));

    let mut seed = 12345u64;
    let mut next = || {
        seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
        ((seed >> 16) & 0x7FFF) as f64 / 32768.0
    };

    for taxon in 0..n_taxa {
        for sample in 0..n_samples {
            let treated = sample >= n_samples / 2;
            let base = 50.0 + 400.0 / (taxon as f64 + 1.0);
            let effect = match taxon {
                0..=2 if treated => 4.0,
                3..=5 if !treated => 3.0,
                _ => 1.0,
            };
            let count = (base * effect * (0.7 + 0.6 * next())).round() as u64;
            if count > 0 {
                tri_mat.add_triplet(taxon, sample, count);
            }
        }
    }

    let taxon_ids = (0..n_taxa).map(|i| format!("OTU_{:03}", i)).collect();
    let sample_ids: Vec<String> = (0..n_samples).map(|i| format!("S{:02}", i)).collect();
    let counts = CountMatrix::new(tri_mat.to_csr(), taxon_ids, sample_ids.clone())
        .expect("valid synthetic matrix");

    let rows = sample_ids
        .iter()
        .enumerate()
        .map(|(i, sid)| {
            let group = if i < n_samples / 2 { "control" } else { "treatment" };
            (sid.clone(), vec![group])
        })
        .collect();
    let metadata = Metadata::from_rows(vec!["group".to_string()], rows)
        .expect("valid synthetic metadata");

    (counts, metadata)
}
