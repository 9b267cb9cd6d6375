use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::{error, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

use elpp::graph::Node;
use elpp::instance;
use elpp::{ElppSolver, Formulation, SolverConfig, Status};

/// Compute elementary longest paths over a graph instance with one or
/// more integer-programming formulations.
///
/// If no origins and/or destinations are specified, all combinations are
/// solved.
#[derive(Debug, Parser)]
#[command(name = "elpp", version)]
struct Args {
    /// Name of the data file.
    #[arg(short = 'f', long)]
    file: PathBuf,

    /// Name of a file with a list of (s, t) pairs.
    #[arg(short = 'p', long)]
    pairs: Option<PathBuf>,

    /// Subtour elimination: 0 NONE, 1 MCF, 2 SC (default), 3 MinCut,
    /// 4 SF, 5 RLT, 6 MTZ, 7 DL, 8 DFJ, 9 MCFsep. Repeatable.
    #[arg(short = 'c', long = "formulation")]
    formulations: Vec<i32>,

    /// Origin node(s); repeatable.
    #[arg(short = 's', long = "origin")]
    origins: Vec<Node>,

    /// Destination node(s); repeatable.
    #[arg(short = 't', long = "destination")]
    destinations: Vec<Node>,

    /// Use random origin/destination subsets of this cardinality and
    /// solve for all combinations.
    #[arg(short = 'n', long)]
    sample: Option<usize>,

    /// Stop after this many problems have been solved.
    #[arg(short = 'k', long)]
    max_problems: Option<usize>,

    /// Time limit in seconds.
    #[arg(short = 'T', long, default_value_t = 1200)]
    time_limit: u64,

    /// Max cuts added per separation callback; -1 adds all violated
    /// inequalities.
    #[arg(short = 'm', long, default_value_t = 1)]
    max_cuts: i32,

    /// Cut violation tolerance.
    #[arg(short = 'e', long, default_value_t = 1e-3)]
    epsilon: f64,

    /// Read arc variable bounds from the data file.
    #[arg(short = 'b', long)]
    bounds: bool,

    /// Solve the LP relaxation instead of the integer program.
    #[arg(short = 'r', long)]
    relax: bool,

    /// Seed for endpoint sampling.
    #[arg(long, default_value_t = 2)]
    seed: u64,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    let _ = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> elpp::Result<()> {
    let instance = instance::read_instance_file(&args.file, args.bounds)?;
    let graph = &instance.graph;

    let mut formulations = Vec::new();
    for &code in &args.formulations {
        formulations.push(Formulation::try_from(code)?);
    }
    if formulations.is_empty() {
        println!("No formulation selected. Using Strong Component (SC).");
        formulations.push(Formulation::StrongComponent);
    }
    println!("Selected formulations:");
    for form in &formulations {
        println!("  {form}");
    }

    let pairs = endpoint_pairs(args, &instance)?;
    println!("Set of {} s-t pairs.", pairs.len());
    let max_problems = args.max_problems.unwrap_or(pairs.len());
    if max_problems < pairs.len() {
        println!("[Solving at most {max_problems}.]");
    }

    let mut solved = 0usize;
    for &(s, t) in &pairs {
        if s == t {
            continue;
        }
        if solved >= max_problems {
            break;
        }
        println!("----{s} {t}----{solved}");
        for &form in &formulations {
            // The compact MCF model is quadratic in the graph size; skip
            // it on large instances like the original driver does.
            let n = graph.num_nodes();
            if (form == Formulation::Mcf && n >= 100)
                || (args.relax && form == Formulation::McfRowGeneration && n >= 500)
            {
                println!("###{form}\t: - -");
                continue;
            }
            let config = SolverConfig {
                relax: args.relax,
                time_limit: Duration::from_secs(args.time_limit),
                epsilon: args.epsilon,
                max_cuts: args.max_cuts,
            };
            let mut solver = ElppSolver::new(graph, (s, t), form, config)?;
            if instance.has_bounds() {
                solver.update_problem_with_bounds(graph.costs(), &instance.lower, &instance.upper)?;
            } else {
                solver.update_problem(graph.costs())?;
            }
            let status = if args.relax {
                solver.solve_lp()
            } else {
                solver.solve()
            };
            let elapsed = solver.elapsed().as_secs_f64();
            match (status, solver.objective_value()) {
                (Status::Optimal, Some(objective)) => {
                    println!("###{form}\t: {objective} {elapsed:.3}");
                }
                (_, _) => {
                    println!("###{form}\t: Status: {status}, not solved to optimality! {elapsed:.3}");
                }
            }
        }
        solved += 1;
    }
    Ok(())
}

/// Assembles the (source, sink) work list: an explicit pairs file wins,
/// otherwise all combinations of the given (or sampled) origins and
/// destinations.
fn endpoint_pairs(args: &Args, instance: &instance::Instance) -> elpp::Result<Vec<(Node, Node)>> {
    let graph = &instance.graph;
    if let Some(path) = &args.pairs {
        if args.origins.is_empty() && args.destinations.is_empty() {
            return instance::read_pairs_file(path, graph);
        }
    }

    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let mut origins = args.origins.clone();
    if origins.iter().any(|s| !graph.contains_node(*s)) {
        warn!("an origin is not in the graph; sampling origins instead");
        origins.clear();
    }
    if origins.is_empty() {
        origins = instance::sample_nodes(graph.nodes(), args.sample.unwrap_or(0), &mut rng);
    }
    let mut destinations = args.destinations.clone();
    if destinations.iter().any(|t| !graph.contains_node(*t)) {
        warn!("a destination is not in the graph; sampling destinations instead");
        destinations.clear();
    }
    if destinations.is_empty() {
        destinations = instance::sample_nodes(graph.nodes(), args.sample.unwrap_or(0), &mut rng);
    }

    let mut pairs = Vec::with_capacity(origins.len() * destinations.len());
    for &s in &origins {
        for &t in &destinations {
            pairs.push((s, t));
        }
    }
    Ok(pairs)
}
