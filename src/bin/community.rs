//! community - two-group microbial community comparison CLI
//!
//! Command-line interface for diversity, SIMPER and co-occurrence network
//! analysis of amplicon count tables.

use clap::{Parser, Subcommand, ValueEnum};
use composable_community::data::{CountMatrix, Metadata, TableOrientation};
use composable_community::diversity::{alpha_diversity, bray_curtis_matrix, pcoa, AlphaMetric};
use composable_community::error::Result;
use composable_community::filter::{filter_relative_abundance, filter_relative_abundance_with_stats};
use composable_community::network::{build_network, top_degree};
use composable_community::pipeline::{AnalysisConfig, Pipeline};
use composable_community::profile::profile_library_size;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// CLI-friendly table orientation
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliOrientation {
    /// One row per taxon
    TaxaRows,
    /// One row per sample
    SampleRows,
}

impl From<CliOrientation> for TableOrientation {
    fn from(o: CliOrientation) -> Self {
        match o {
            CliOrientation::TaxaRows => TableOrientation::TaxaAsRows,
            CliOrientation::SampleRows => TableOrientation::SamplesAsRows,
        }
    }
}

/// Two-group microbial community comparison
#[derive(Parser)]
#[command(name = "community")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose logging (debug level unless RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full analysis and write a JSON report plus TSV tables
    Run {
        /// Path to analysis configuration YAML (defaults if omitted)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Path to count table TSV
        #[arg(short = 'c', long)]
        counts: PathBuf,

        /// Path to metadata TSV
        #[arg(short, long)]
        metadata: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Apply the relative-abundance filter and write the filtered table
    Filter {
        /// Path to count table TSV
        #[arg(short = 'c', long)]
        counts: PathBuf,

        /// Relative-abundance threshold of the grand total
        #[arg(short, long, default_value = "0.0001")]
        threshold: f64,

        /// Table layout
        #[arg(long, value_enum, default_value = "sample-rows")]
        orientation: CliOrientation,

        /// Output path for the filtered TSV (written taxa-rows)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Build a co-occurrence network for the samples of one table
    Network {
        /// Path to count table TSV
        #[arg(short = 'c', long)]
        counts: PathBuf,

        /// Relative-abundance threshold applied before correlation
        #[arg(long, default_value = "0.001")]
        threshold: f64,

        /// Edges need a p-value below this
        #[arg(long, default_value = "0.001")]
        p_threshold: f64,

        /// Edges need |r| above this
        #[arg(long, default_value = "0.7")]
        r_threshold: f64,

        /// Number of top-degree taxa to print (ties included)
        #[arg(long, default_value = "10")]
        top: usize,

        /// Table layout
        #[arg(long, value_enum, default_value = "sample-rows")]
        orientation: CliOrientation,

        /// Output prefix for <prefix>_edges.tsv and <prefix>_nodes.tsv
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Compute alpha diversity and Bray-Curtis distances
    Diversity {
        /// Path to count table TSV
        #[arg(short = 'c', long)]
        counts: PathBuf,

        /// Table layout
        #[arg(long, value_enum, default_value = "sample-rows")]
        orientation: CliOrientation,

        /// Output path for the distance matrix TSV
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Generate an example analysis configuration
    Example {
        /// Output path for the example YAML
        #[arg(short, long, default_value = "analysis.yaml")]
        output: PathBuf,
    },
}

/// Initialize tracing subscriber writing to stderr
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            config,
            counts,
            metadata,
            output,
        } => cmd_run(config.as_ref(), &counts, &metadata, &output),

        Commands::Filter {
            counts,
            threshold,
            orientation,
            output,
        } => cmd_filter(&counts, threshold, orientation.into(), &output),

        Commands::Network {
            counts,
            threshold,
            p_threshold,
            r_threshold,
            top,
            orientation,
            output,
        } => cmd_network(
            &counts,
            threshold,
            p_threshold,
            r_threshold,
            top,
            orientation.into(),
            &output,
        ),

        Commands::Diversity {
            counts,
            orientation,
            output,
        } => cmd_diversity(&counts, orientation.into(), &output),

        Commands::Example { output } => cmd_example(&output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Run the full analysis
fn cmd_run(
    config_path: Option<&PathBuf>,
    counts_path: &PathBuf,
    metadata_path: &PathBuf,
    output_dir: &PathBuf,
) -> Result<()> {
    let config = match config_path {
        Some(path) => {
            eprintln!("Loading configuration from {:?}...", path);
            AnalysisConfig::from_file(path)?
        }
        None => AnalysisConfig::default(),
    };

    eprintln!("Loading data...");
    let counts = CountMatrix::from_tsv(counts_path, config.orientation)?;
    let metadata = Metadata::from_tsv(metadata_path)?;
    eprintln!(
        "Loaded {} taxa x {} samples",
        counts.n_taxa(),
        counts.n_samples()
    );

    eprintln!("Running analysis (group column '{}')...", config.group_column);
    let analysis = Pipeline::from_config(config).run(&counts, &metadata)?;

    eprintln!("Writing outputs to {:?}...", output_dir);
    let written = analysis.write_outputs(output_dir)?;

    let report = analysis.report();
    eprintln!("Done! {} files written", written.len());
    eprintln!(
        "  PERMANOVA: F={:.3}, R2={:.3}, p={:.4}",
        report.permanova.pseudo_f, report.permanova.r_squared, report.permanova.p_value
    );
    eprintln!(
        "  SIMPER {} vs {}: mean dissimilarity {:.3}",
        report.simper.group_a, report.simper.group_b, report.simper.overall_dissimilarity
    );
    for (label, net) in &report.networks {
        eprintln!(
            "  Network {}: {} nodes, {} edges, top degree {:?}",
            label, net.n_nodes, net.n_edges, net.top_degree
        );
    }
    let alpha = report.config.alpha;
    eprintln!(
        "  {} SIMPER taxa significant at q < {}",
        report.simper_tests.significant_at(alpha).len(),
        alpha
    );
    for warning in &report.warnings {
        eprintln!("  Warning: {}", warning);
    }

    Ok(())
}

/// Filter a count table by relative abundance
fn cmd_filter(
    counts_path: &PathBuf,
    threshold: f64,
    orientation: TableOrientation,
    output_path: &PathBuf,
) -> Result<()> {
    eprintln!("Loading count table...");
    let counts = CountMatrix::from_tsv(counts_path, orientation)?;

    let (filtered, stats) = filter_relative_abundance_with_stats(&counts, threshold)?;
    eprint!("{}", stats);

    eprintln!("Writing filtered table to {:?}...", output_path);
    filtered.to_tsv(output_path)?;
    Ok(())
}

/// Build a single co-occurrence network
fn cmd_network(
    counts_path: &PathBuf,
    threshold: f64,
    p_threshold: f64,
    r_threshold: f64,
    top: usize,
    orientation: TableOrientation,
    output_prefix: &PathBuf,
) -> Result<()> {
    eprintln!("Loading count table...");
    let counts = CountMatrix::from_tsv(counts_path, orientation)?;
    let filtered = filter_relative_abundance(&counts, threshold)?;
    eprintln!(
        "Correlating {} taxa over {} samples...",
        filtered.n_taxa(),
        filtered.n_samples()
    );

    let network = build_network(&filtered, p_threshold, r_threshold)?;

    let prefix = output_prefix.display();
    let edges_path = PathBuf::from(format!("{}_edges.tsv", prefix));
    let nodes_path = PathBuf::from(format!("{}_nodes.tsv", prefix));
    network.edges_to_tsv(&edges_path)?;
    network.nodes_to_tsv(&nodes_path)?;

    eprintln!(
        "Done! {} nodes, {} edges",
        network.n_nodes(),
        network.n_edges()
    );
    eprintln!("Top degree (ties included):");
    for id in top_degree(&network, top) {
        let idx = network.taxon_ids().iter().position(|t| *t == id).unwrap_or(0);
        eprintln!("  {}: {}", id, network.degree(idx));
    }
    Ok(())
}

/// Alpha and beta diversity for a count table
fn cmd_diversity(
    counts_path: &PathBuf,
    orientation: TableOrientation,
    output_path: &PathBuf,
) -> Result<()> {
    eprintln!("Loading count table...");
    let counts = CountMatrix::from_tsv(counts_path, orientation)?;

    eprint!("{}", profile_library_size(&counts));

    let alpha = alpha_diversity(&counts)?;
    let header: Vec<&str> = AlphaMetric::ALL.iter().map(|m| m.name()).collect();
    println!("sample_id\t{}", header.join("\t"));
    for a in &alpha {
        let values: Vec<String> = AlphaMetric::ALL
            .iter()
            .map(|&m| format!("{:.4}", a.value(m)))
            .collect();
        println!("{}\t{}", a.sample_id, values.join("\t"));
    }

    let distances = bray_curtis_matrix(&counts)?;
    distances.to_tsv(output_path)?;
    eprintln!("Wrote Bray-Curtis distances to {:?}", output_path);

    let ordination = pcoa(&distances, 2)?;
    for (axis, share) in ordination.proportion_explained.iter().enumerate() {
        eprintln!("  PCoA axis {}: {:.1}% explained", axis + 1, share * 100.0);
    }
    Ok(())
}

/// Write an example configuration
fn cmd_example(output_path: &PathBuf) -> Result<()> {
    let config = Pipeline::new()
        .group_column("group")
        .compare("control", "treatment")
        .config()
        .clone();
    let yaml = config.to_yaml()?;

    std::fs::write(output_path, &yaml)?;
    eprintln!("Wrote example configuration to {:?}", output_path);
    eprintln!();
    eprintln!("Contents:");
    println!("{}", yaml);

    Ok(())
}
