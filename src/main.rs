use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ferrous_tree::matrix::flat::read_distance_file;
use ferrous_tree::utils::{cputime, realtime};
use ferrous_tree::{available_algorithms, build, BuildOpt};

#[derive(Parser)]
#[command(name = "ferrous-tree")]
#[command(about = "FerrousTree - phylogenetic tree construction from distance matrices (Rust implementation)", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a tree from a distance-matrix file
    Build {
        /// Input distance-matrix file (square, upper or lower shape; .gz ok)
        #[arg(value_name = "DIST.MAT")]
        matrix: PathBuf,

        /// Algorithm to run (see 'list' for the registry)
        #[arg(short = 't', long, value_name = "NAME", default_value = "NJ")]
        algorithm: String,

        /// Output Newick file (default: stdout)
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Digits after the decimal point in branch lengths
        #[arg(short = 'p', long, value_name = "INT", default_value = "6")]
        precision: usize,

        /// Number of threads for the row kernels (0 = all available cores)
        #[arg(long, value_name = "INT", default_value = "0")]
        threads: usize,

        /// Verbose level: 1=error, 2=warning, 3=message, 4+=debugging
        #[arg(short = 'v', long, value_name = "INT", default_value = "3")]
        verbosity: i32,

        /// Gzip-compress the output tree file
        #[arg(long)]
        gzip: bool,

        /// Emit a rooted tree (2-way root) instead of the unrooted 3-way
        /// terminal link
        #[arg(long)]
        rooted: bool,

        /// Emit the root's children without the enclosing parentheses
        #[arg(long)]
        subtree_only: bool,
    },

    /// List the registered algorithms
    List,
}

fn init_logger(verbosity: i32) {
    let log_level = match verbosity {
        v if v <= 1 => log::LevelFilter::Error,
        2 => log::LevelFilter::Warn,
        3 => log::LevelFilter::Info,
        4 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::List => {
            init_logger(3);
            for info in available_algorithms() {
                println!("{:<10} {}", info.name, info.description);
            }
        }

        Commands::Build {
            matrix,
            algorithm,
            output,
            precision,
            threads,
            verbosity,
            gzip,
            rooted,
            subtree_only,
        } => {
            init_logger(verbosity);

            let mut num_threads = threads;
            let max_threads = num_cpus::get() * 2;
            if num_threads > max_threads {
                log::warn!(
                    "Thread count {} exceeds recommended maximum {}, capping at {}",
                    num_threads,
                    max_threads,
                    max_threads
                );
                num_threads = max_threads;
            }

            log::info!("Reading distance matrix: {}", matrix.display());
            let flat = match read_distance_file(&matrix) {
                Ok(flat) => flat,
                Err(e) => {
                    log::error!("{}", e);
                    std::process::exit(1);
                }
            };
            log::info!(
                "Loaded {} taxa; constructing {} tree",
                flat.size(),
                algorithm
            );

            let mut opt = BuildOpt::new();
            opt.precision = precision;
            opt.threads = num_threads;
            opt.verbosity = verbosity;
            opt.zipped_output = gzip;
            opt.rooted = rooted;
            opt.subtree_only = subtree_only;

            let wall_start = realtime();
            let cpu_start = cputime();
            let newick = match build(&algorithm, flat.names(), flat.distances(), &opt) {
                Ok(newick) => newick,
                Err(e) => {
                    log::error!("{}", e);
                    std::process::exit(1);
                }
            };
            log::info!(
                "Constructed tree in {:.3}s wall, {:.3}s cpu",
                realtime() - wall_start,
                cputime() - cpu_start
            );

            match output {
                Some(path) => {
                    if let Err(e) = write_tree_file(&newick, &path, gzip) {
                        log::error!("Failed to write {}: {}", path.display(), e);
                        std::process::exit(1);
                    }
                    log::info!("Wrote tree to {}", path.display());
                }
                None => {
                    println!("{}", newick);
                }
            }
        }
    }
}

fn write_tree_file(newick: &str, path: &std::path::Path, gzip: bool) -> std::io::Result<()> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let file = std::fs::File::create(path)?;
    let mut out: Box<dyn Write> = if gzip
        || path.extension().and_then(|s| s.to_str()) == Some("gz")
    {
        Box::new(GzEncoder::new(std::io::BufWriter::new(file), Compression::default()))
    } else {
        Box::new(std::io::BufWriter::new(file))
    };
    writeln!(out, "{}", newick)?;
    out.flush()
}
