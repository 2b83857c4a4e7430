//! Command-line front end for the millcut partitioner.

use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use log::info;

use millcut::config::{
    ApplyMoveStrategy, PartitionConfig, RefinementType, SchedulerKind, StopRuleKind,
};
use millcut::error::PartitionError;
use millcut::graph::{io, BlockId, CsrGraph};
use millcut::metrics;
use millcut::partitioner;
use millcut::refinement::{boundary::QuotientBoundary, cycle_balance};

#[derive(Parser, Debug)]
#[command(
    name = "millcut",
    version,
    about = "Parallel multi-level graph partitioner"
)]
struct Args {
    /// Graph file in the DIMACS-like adjacency format.
    filename: String,

    /// Number of blocks (>= 2).
    #[arg(long)]
    k: u32,

    /// Allowed imbalance in percent.
    #[arg(long, default_value_t = 3.0)]
    imbalance: f64,

    /// RNG seed.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Worker threads, including the calling thread.
    #[arg(long = "num_threads", default_value_t = 1)]
    num_threads: usize,

    /// Core the main thread prefers; recorded only, pinning stays with the OS.
    #[arg(long = "main_core", default_value_t = 0)]
    main_core: usize,

    /// Refine this partition instead of partitioning from scratch.
    #[arg(long = "input_partition")]
    input_partition: Option<String>,

    /// Repeat the partitioner while wall time remains; keep the best cut.
    #[arg(long = "time_limit", default_value_t = 0.0)]
    time_limit: f64,

    /// Run the perfectly-balanced post-pass.
    #[arg(long = "kaffpa_perfectly_balance")]
    kaffpa_perfectly_balance: bool,

    /// Use label propagation instead of FM refinement.
    #[arg(long = "label_propagation_refinement")]
    label_propagation_refinement: bool,

    /// Parallel label propagation.
    #[arg(long = "parallel_lp")]
    parallel_lp: bool,

    /// Node-block granularity for parallel label propagation.
    #[arg(long = "block_size", default_value_t = 1000)]
    block_size: usize,

    /// Use the parallel multi-try k-way refiner.
    #[arg(long = "parallel_multitry_kway")]
    parallel_multitry_kway: bool,

    /// Conflict policy of the parallel apply phase.
    #[arg(long = "apply_move_strategy", default_value = "local_search",
          value_parser = parse_move_strategy)]
    apply_move_strategy: ApplyMoveStrategy,

    /// Stop rule for k-way FM rounds.
    #[arg(long = "kway_stop_rule", default_value = "adaptive",
          value_parser = parse_stop_rule)]
    kway_stop_rule: StopRuleKind,

    #[arg(long = "chernoff_stop_probability", default_value_t = 0.9)]
    chernoff_stop_probability: f64,

    #[arg(long = "chernoff_gradient_descent_num_steps", default_value_t = 10)]
    chernoff_gradient_descent_num_steps: usize,

    #[arg(long = "chernoff_gradient_descent_step_size", default_value_t = 0.05)]
    chernoff_gradient_descent_step_size: f64,

    #[arg(long = "chernoff_min_step_limit", default_value_t = 15)]
    chernoff_min_step_limit: usize,

    #[arg(long = "chernoff_max_step_limit", default_value_t = 500)]
    chernoff_max_step_limit: usize,

    /// Output file; defaults to `tmppartition<k>`.
    #[arg(long = "output_filename")]
    output_filename: Option<String>,

    /// Print only the final summary.
    #[arg(long = "suppress_output")]
    suppress_output: bool,
}

fn parse_move_strategy(s: &str) -> Result<ApplyMoveStrategy, String> {
    match s {
        "local_search" => Ok(ApplyMoveStrategy::LocalSearch),
        "gain_recalculation" => Ok(ApplyMoveStrategy::GainRecalculation),
        "reactive_vertices" => Ok(ApplyMoveStrategy::ReactiveVertices),
        "skip" => Ok(ApplyMoveStrategy::Skip),
        other => Err(format!("unknown apply_move_strategy `{other}`")),
    }
}

fn parse_stop_rule(s: &str) -> Result<StopRuleKind, String> {
    match s {
        "simple" => Ok(StopRuleKind::Simple),
        "adaptive" => Ok(StopRuleKind::Adaptive),
        "chernoff_adaptive" => Ok(StopRuleKind::ChernoffAdaptive),
        other => Err(format!("unknown kway_stop_rule `{other}`")),
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("millcut: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), PartitionError> {
    let mut config = PartitionConfig {
        k: args.k,
        imbalance: args.imbalance,
        seed: args.seed,
        num_threads: args.num_threads,
        main_core: args.main_core,
        parallel_multitry_kway: args.parallel_multitry_kway,
        label_propagation_refinement: args.label_propagation_refinement,
        parallel_lp: args.parallel_lp,
        block_size: args.block_size,
        refinement_type: RefinementType::Fm,
        kway_stop_rule: args.kway_stop_rule,
        apply_move_strategy: args.apply_move_strategy,
        chernoff_stop_probability: args.chernoff_stop_probability,
        chernoff_gradient_descent_num_steps: args.chernoff_gradient_descent_num_steps,
        chernoff_gradient_descent_step_size: args.chernoff_gradient_descent_step_size,
        chernoff_min_step_limit: args.chernoff_min_step_limit,
        chernoff_max_step_limit: args.chernoff_max_step_limit,
        input_partition: args.input_partition.clone(),
        perfectly_balance: args.kaffpa_perfectly_balance,
        time_limit: args.time_limit,
        ..Default::default()
    };
    config.validate()?;

    let io_timer = Instant::now();
    let mut graph = io::read_graph(&args.filename)?;
    info!("io time: {:.3}s", io_timer.elapsed().as_secs_f64());
    info!(
        "graph has {} nodes and {} edges",
        graph.n(),
        graph.m() / 2
    );

    config.configure_balance(&graph);

    if let Some(path) = &args.input_partition {
        io::read_partition(&graph, config.k, path)?;
        config.enable_input_partition_mode();
        info!("refining supplied partition from {path}");
    }

    if !args.suppress_output {
        report_algorithm(&config);
    }

    // perform partitioning
    let timer = Instant::now();
    if config.time_limit == 0.0 {
        partitioner::perform_partitioning(&config, &mut graph)?;
    } else {
        let mut best: Option<(i64, Vec<BlockId>)> = None;
        let mut round = 0u64;
        while timer.elapsed().as_secs_f64() < config.time_limit {
            let mut round_config = config.clone();
            round_config.graph_already_partitioned = false;
            round_config.seed = config.seed.wrapping_add(round);
            round += 1;
            partitioner::perform_partitioning(&round_config, &mut graph)?;
            let cut = metrics::edge_cut(&graph);
            if best.as_ref().is_none_or(|&(c, _)| cut < c) {
                best = Some((cut, graph.export_partition()));
            }
        }
        if let Some((_, labels)) = best {
            graph.import_partition(&labels);
        }
    }

    if config.perfectly_balance {
        perfectly_balance(&config, &graph);
    }
    info!(
        "time spent for partitioning {:.3}s",
        timer.elapsed().as_secs_f64()
    );

    report_quality(&graph, config.k);

    let output = args
        .output_filename
        .unwrap_or_else(|| format!("tmppartition{}", config.k));
    io::write_partition(&graph, &output)?;
    info!("partition written to {output}");
    Ok(())
}

/// Tighten the bound to `(1 + eps) * ceil(total / k)` and drain.
fn perfectly_balance(config: &PartitionConfig, graph: &CsrGraph) {
    let mut tightened = config.clone();
    tightened.upper_bound_partition = ((1.0 + config.epsilon())
        * (config.total_graph_weight as f64 / config.k as f64).ceil())
        as i64;
    let mut boundary = QuotientBoundary::build(graph, config.k);
    cycle_balance::perform_refinement(&tightened, graph, &mut boundary);
}

fn report_algorithm(config: &PartitionConfig) {
    if config.label_propagation_refinement {
        if config.parallel_lp {
            println!("Algorithm\tparallel lp");
        } else {
            println!("Algorithm\tsequential lp");
        }
        println!("Block size\t{}", config.block_size);
    } else if config.parallel_multitry_kway {
        println!("Algorithm\tparallel multitry kway");
    } else {
        println!("Algorithm\tsequential multitry kway");
    }
    println!("Num threads\t{}", config.num_threads);

    let strategy = match config.apply_move_strategy {
        ApplyMoveStrategy::LocalSearch => "local search",
        ApplyMoveStrategy::GainRecalculation => "gain recalculation",
        ApplyMoveStrategy::ReactiveVertices => "reactivate vertices",
        ApplyMoveStrategy::Skip => "skip",
    };
    println!("Move strategy\t{strategy}");

    match config.kway_stop_rule {
        StopRuleKind::Simple => println!("Kway stop rule\tsimple"),
        StopRuleKind::Adaptive => println!("Kway stop rule\tadaptive"),
        StopRuleKind::ChernoffAdaptive => {
            println!("Kway stop rule\tchernoff_adaptive");
            println!("Stop probability\t{}", config.chernoff_stop_probability);
            println!(
                "Num gradient descent steps\t{}",
                config.chernoff_gradient_descent_num_steps
            );
            println!(
                "Gradient descent step size\t{}",
                config.chernoff_gradient_descent_step_size
            );
            println!("Min step limit\t{}", config.chernoff_min_step_limit);
            println!("Max step limit\t{}", config.chernoff_max_step_limit);
        }
    }
    let scheduler = match config.scheduler {
        SchedulerKind::Simple => "simple",
        SchedulerKind::ActiveBlocks => "active blocks",
        SchedulerKind::ActiveBlocksRefKway => "active blocks + kway",
    };
    println!("Scheduler\t{scheduler}");
}

fn report_quality(graph: &CsrGraph, k: u32) {
    println!("cut\t\t{}", metrics::edge_cut(graph));
    println!("finalobjective\t{}", metrics::edge_cut(graph));
    println!("bnd\t\t{}", metrics::boundary_nodes(graph));
    println!("balance\t\t{:.5}", metrics::balance(graph, k));
    println!("max_comm_vol\t{}", metrics::max_communication_volume(graph, k));
}
